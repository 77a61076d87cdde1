#![warn(clippy::all)]

mod data;
mod render;
mod threaded;

use data::RenderingData;
use prism_core::{
    gpu::{
        engine_3d::{Polygon, PALETTE_SLOT_LEN, TEXTURE_SLOT_LEN},
        Framebuffer, Scanline, SCREEN_HEIGHT, TILES, TILE_HEIGHT,
    },
    utils::Bytes,
};
use render::RawRenderer;
use std::{hint, sync::atomic::Ordering, sync::Arc, thread};
use threaded::{tile_state, SharedData};

/// The software rasterizer's host-facing surface.
///
/// The host drives a frame by calling [`draw_scanline`](Self::draw_scanline)
/// for lines 0..192 in order. In threaded mode the whole frame is rendered
/// ahead across four 48-line tile workers, and the calls only synchronize
/// with them; geometry, textures and register state must not change while a
/// frame is in flight, matching the hardware's vblank-only update window.
pub struct Renderer {
    shared: Arc<SharedData>,
    threads: Vec<thread::JoinHandle<()>>,
    tiles: [RawRenderer; TILES],
    threaded_3d: bool,
    #[cfg(feature = "log")]
    logger: slog::Logger,
}

impl Renderer {
    pub fn new(#[cfg(feature = "log")] logger: slog::Logger) -> Self {
        let shared = Arc::new(SharedData::new());
        let threads = (0..TILES)
            .map(|tile| threaded::spawn_worker(tile, Arc::clone(&shared)))
            .collect();
        Renderer {
            shared,
            threads,
            tiles: [RawRenderer::new(); TILES],
            threaded_3d: false,
            #[cfg(feature = "log")]
            logger,
        }
    }

    /// Selects between single-threaded and four-tile threaded rendering;
    /// takes effect at the next frame's first scanline.
    pub fn set_threaded_3d(&mut self, threaded: bool) {
        #[cfg(feature = "log")]
        slog::trace!(self.logger, "Threaded 3D {}", if threaded { "on" } else { "off" });
        self.threaded_3d = threaded;
    }

    pub fn draw_scanline(&mut self, line: u8) {
        debug_assert!((line as usize) < SCREEN_HEIGHT);

        if self.threaded_3d {
            if line == 0 {
                // Render the entire frame in advance across the four tile
                // workers; the hardware's 48-line cache makes no observable
                // difference since geometry only swaps at vblank
                self.wait_for_frame_end();
                #[cfg(feature = "log")]
                slog::trace!(self.logger, "Kicking tile workers");
                for state in &self.shared.tile_states {
                    state.store(tile_state::PENDING, Ordering::Release);
                }
                for thread in &self.threads {
                    thread.thread().unpark();
                }
            } else if line as usize % TILE_HEIGHT == TILE_HEIGHT - 1 {
                // The host may consume the tile's rows after this call
                self.wait_for_tile(line as usize / TILE_HEIGHT);
            }
        } else {
            self.wait_for_frame_end();
            let rendering_data = unsafe { &*self.shared.rendering_data.get() };
            let fb_lines = self.shared.framebuffer.get().cast::<Scanline<u32>>();
            let fb_line = unsafe { &mut *fb_lines.add(line as usize) };
            self.tiles[line as usize / TILE_HEIGHT].render_scanline(rendering_data, fb_line, line);
        }
    }

    /// Reads a rendered scanline, waiting for the owning tile's worker
    /// first.
    pub fn scanline(&self, line: u8) -> &Scanline<u32> {
        debug_assert!((line as usize) < SCREEN_HEIGHT);
        self.wait_for_tile(line as usize / TILE_HEIGHT);
        unsafe {
            &*self
                .shared
                .framebuffer
                .get()
                .cast::<Scanline<u32>>()
                .add(line as usize)
        }
    }

    /// Reads the whole framebuffer, waiting for any outstanding workers.
    pub fn framebuffer(&self) -> &Framebuffer {
        self.wait_for_frame_end();
        unsafe { &*self.shared.framebuffer.get() }
    }

    pub fn write_control(&mut self, mask: u16, value: u16) {
        self.rendering_data_mut().state.write_control(mask, value);
    }

    pub fn write_clear_color(&mut self, mask: u32, value: u32) {
        self.rendering_data_mut().state.write_clear_color(mask, value);
    }

    pub fn write_clear_depth(&mut self, mask: u16, value: u16) {
        self.rendering_data_mut().state.write_clear_depth(mask, value);
    }

    pub fn write_toon_table(&mut self, index: usize, mask: u16, value: u16) {
        self.rendering_data_mut()
            .state
            .write_toon_table(index, mask, value);
    }

    /// Installs or clears one 128 KiB texture slot (slots 0..4), copying the
    /// data in.
    pub fn install_texture_slot(&mut self, i: usize, data: Option<&Bytes<TEXTURE_SLOT_LEN>>) {
        #[cfg(feature = "log")]
        slog::debug!(
            self.logger,
            "Texture slot {} {}",
            i,
            if data.is_some() { "installed" } else { "cleared" }
        );
        self.rendering_data_mut().set_texture_slot(i, data);
    }

    /// Installs or clears one 16 KiB palette slot (slots 0..8), copying the
    /// data in.
    pub fn install_palette_slot(&mut self, i: usize, data: Option<&Bytes<PALETTE_SLOT_LEN>>) {
        #[cfg(feature = "log")]
        slog::debug!(
            self.logger,
            "Palette slot {} {}",
            i,
            if data.is_some() { "installed" } else { "cleared" }
        );
        self.rendering_data_mut().set_palette_slot(i, data);
    }

    /// Installs the frame's polygon list (up to 2048 polygons), copying it
    /// in.
    pub fn install_polygons(&mut self, polys: &[Polygon]) {
        #[cfg(feature = "log")]
        slog::debug!(self.logger, "Installing {} polygons", polys.len());
        self.rendering_data_mut().set_polygons(polys);
    }

    fn rendering_data_mut(&mut self) -> &mut RenderingData {
        self.wait_for_frame_end();
        unsafe { &mut *self.shared.rendering_data.get() }
    }

    fn wait_for_tile(&self, tile: usize) {
        while self.shared.tile_states[tile].load(Ordering::Acquire) != tile_state::DONE {
            hint::spin_loop();
        }
    }

    fn wait_for_frame_end(&self) {
        for tile in 0..TILES {
            self.wait_for_tile(tile);
        }
    }
}

#[cfg(not(feature = "log"))]
impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
        for thread in self.threads.drain(..) {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}
