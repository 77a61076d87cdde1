use prism_core::{
    gpu::engine_3d::{
        Polygon, RenderingState, PALETTE_SLOTS, PALETTE_SLOT_LEN, POLY_RAM_LEN, TEXTURE_SLOTS,
        TEXTURE_SLOT_LEN,
    },
    utils::{zeroed_box, Bytes},
};

/// Everything the rasterizer reads during a frame: register state, the
/// installed texture/palette slots and the polygon list.
///
/// Immutable while a frame is being drawn; the host mutates it between
/// frames through the renderer's install and register write operations.
pub struct RenderingData {
    pub state: RenderingState,
    textures: [Option<Box<Bytes<TEXTURE_SLOT_LEN>>>; TEXTURE_SLOTS],
    tex_pal: [Option<Box<Bytes<PALETTE_SLOT_LEN>>>; PALETTE_SLOTS],
    polys: Box<[Polygon; POLY_RAM_LEN]>,
    polys_len: u16,
}

impl RenderingData {
    pub fn new() -> Self {
        RenderingData {
            state: RenderingState::new(),
            textures: [None, None, None, None],
            tex_pal: [None, None, None, None, None, None, None, None],
            polys: zeroed_box(),
            polys_len: 0,
        }
    }

    pub(crate) fn polygons(&self) -> &[Polygon] {
        &self.polys[..self.polys_len as usize]
    }

    pub(crate) fn set_polygons(&mut self, polys: &[Polygon]) {
        self.polys[..polys.len()].copy_from_slice(polys);
        self.polys_len = polys.len() as u16;
    }

    pub(crate) fn set_texture_slot(&mut self, i: usize, data: Option<&Bytes<TEXTURE_SLOT_LEN>>) {
        self.textures[i] = data.map(|data| {
            let mut slot = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
            slot.0.copy_from_slice(&data.0);
            slot
        });
    }

    pub(crate) fn set_palette_slot(&mut self, i: usize, data: Option<&Bytes<PALETTE_SLOT_LEN>>) {
        self.tex_pal[i] = data.map(|data| {
            let mut slot = zeroed_box::<Bytes<PALETTE_SLOT_LEN>>();
            slot.0.copy_from_slice(&data.0);
            slot
        });
    }

    pub(crate) fn texture_byte(&self, addr: u32) -> Option<u8> {
        let slot = self.textures[(addr >> 17) as usize & (TEXTURE_SLOTS - 1)].as_deref()?;
        Some(slot.0[addr as usize & (TEXTURE_SLOT_LEN - 1)])
    }

    pub(crate) fn texture_u16(&self, addr: u32) -> Option<u16> {
        let slot = self.textures[(addr >> 17) as usize & (TEXTURE_SLOTS - 1)].as_deref()?;
        Some(slot.read_le_u16(addr as usize & (TEXTURE_SLOT_LEN - 2)))
    }

    pub(crate) fn palette_u16(&self, addr: u32) -> Option<u16> {
        let slot = self.tex_pal[(addr >> 14) as usize & (PALETTE_SLOTS - 1)].as_deref()?;
        Some(slot.read_le_u16(addr as usize & (PALETTE_SLOT_LEN - 2)))
    }
}

impl Default for RenderingData {
    fn default() -> Self {
        Self::new()
    }
}
