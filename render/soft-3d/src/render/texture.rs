use super::utils::interp_color;
use crate::data::RenderingData;
use prism_core::gpu::engine_3d::{rgba5_to_rgba6, Polygon, TextureFormat};

/// Fetches and decodes the texel at `(s, t)` (texel coordinates, possibly
/// out of range) as a packed RGBA6 color. Absent texture or palette slots
/// decode as fully transparent.
pub fn sample(data: &RenderingData, poly: &Polygon, s: i32, t: i32) -> u32 {
    let s = normalize(s, poly.tex_size_s as i32, poly.repeat_s, poly.flip_s) as u32;
    let t = normalize(t, poly.tex_size_t as i32, poly.repeat_t, poly.flip_t) as u32;
    decode(data, poly, s, t).unwrap_or(0)
}

/// Wraps (flipping every second repeat) or clamps a texel coordinate into
/// `0..size`.
fn normalize(mut coord: i32, size: i32, repeat: bool, flip: bool) -> i32 {
    if repeat {
        let mut count = 0;
        while coord < 0 {
            coord += size;
            count += 1;
        }
        while coord >= size {
            coord -= size;
            count += 1;
        }
        if flip && count % 2 != 0 {
            coord = size - 1 - coord;
        }
        coord
    } else {
        coord.clamp(0, size - 1)
    }
}

fn decode(data: &RenderingData, poly: &Polygon, s: u32, t: u32) -> Option<u32> {
    let size_s = poly.tex_size_s as u32;

    match poly.tex_format {
        TextureFormat::None => Some(0),

        TextureFormat::A3I5 => {
            let index = data.texture_byte(poly.tex_addr + (t * size_s + s))? as u32;
            let color = data.palette_u16(poly.pal_addr + ((index & 0x1F) << 1))? & !(1 << 15);
            let alpha = (index >> 5) * 4 + (index >> 5) / 2;
            Some(rgba5_to_rgba6(alpha << 15 | color as u32))
        }

        TextureFormat::Pal4 => {
            let byte = data.texture_byte(poly.tex_addr + (t * size_s + s) / 4)?;
            let index = (byte >> (s % 4 * 2) & 3) as u32;
            if poly.transparent_color_0 && index == 0 {
                return Some(0);
            }
            let color = data.palette_u16(poly.pal_addr + (index << 1))?;
            Some(rgba5_to_rgba6(0x1F << 15 | color as u32))
        }

        TextureFormat::Pal16 => {
            let byte = data.texture_byte(poly.tex_addr + (t * size_s + s) / 2)?;
            let index = (byte >> (s % 2 * 4) & 0xF) as u32;
            if poly.transparent_color_0 && index == 0 {
                return Some(0);
            }
            let color = data.palette_u16(poly.pal_addr + (index << 1))?;
            Some(rgba5_to_rgba6(0x1F << 15 | color as u32))
        }

        TextureFormat::Pal256 => {
            let index = data.texture_byte(poly.tex_addr + (t * size_s + s))? as u32;
            if poly.transparent_color_0 && index == 0 {
                return Some(0);
            }
            let color = data.palette_u16(poly.pal_addr + (index << 1))?;
            Some(rgba5_to_rgba6(0x1F << 15 | color as u32))
        }

        TextureFormat::Compressed4x4 => {
            let tile = t / 4 * (size_s / 4) + s / 4;
            let byte = data.texture_byte(poly.tex_addr + (tile * 4 + t % 4))?;
            let index = (byte >> (s % 4 * 2) & 3) as u16;

            // Each 4-byte tile has a 16-bit palette base in the parallel
            // half of slot 1 (upper quarter for textures in slot 2)
            let pal_data_addr = 0x2_0000
                + ((poly.tex_addr & 0x1_FFFF) >> 1)
                + if poly.tex_addr >> 17 == 2 { 0x1_0000 } else { 0 }
                + tile * 2;
            let pal_data = data.texture_u16(pal_data_addr)?;
            let pal_base = poly.pal_addr + ((pal_data as u32 & 0x3FFF) << 2);

            let color = |i: u32| -> Option<u32> {
                Some(rgba5_to_rgba6(
                    0x1F << 15 | data.palette_u16(pal_base + (i << 1))? as u32,
                ))
            };

            match (pal_data >> 14, index) {
                (0, 3) | (1, 3) => Some(0),
                (1, 2) => Some(interp_color(color(0)?, color(1)?, 0, 1, 2)),
                (3, 2) => Some(interp_color(color(0)?, color(1)?, 0, 3, 8)),
                (3, 3) => Some(interp_color(color(0)?, color(1)?, 0, 5, 8)),
                (_, index) => color(index as u32),
            }
        }

        TextureFormat::A5I3 => {
            let index = data.texture_byte(poly.tex_addr + (t * size_s + s))? as u32;
            let color = data.palette_u16(poly.pal_addr + ((index & 7) << 1))? & !(1 << 15);
            let alpha = index >> 3;
            Some(rgba5_to_rgba6(alpha << 15 | color as u32))
        }

        TextureFormat::Direct => {
            let color = data.texture_u16(poly.tex_addr + 2 * (t * size_s + s))? as u32;
            let alpha = if color & 1 << 15 != 0 { 0x1F } else { 0 };
            Some(rgba5_to_rgba6(alpha << 15 | (color & 0x7FFF)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{
        gpu::engine_3d::{PALETTE_SLOT_LEN, TEXTURE_SLOT_LEN},
        utils::{zeroed_box, Bytes},
    };

    fn pal256_color(index: u16) -> u32 {
        rgba5_to_rgba6(0x1F << 15 | index as u32)
    }

    // A 2x2 256-color texture whose texel at (s, t) has palette index
    // t * 2 + s + 1, with palette entry i holding red intensity i.
    fn two_by_two() -> (RenderingData, Polygon) {
        let mut data = RenderingData::new();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.0[..4].copy_from_slice(&[1, 2, 3, 4]);
        data.set_texture_slot(0, Some(&texture));

        let mut palette = zeroed_box::<Bytes<PALETTE_SLOT_LEN>>();
        for i in 0..8 {
            palette.write_le_u16(i * 2, i as u16);
        }
        data.set_palette_slot(0, Some(&palette));

        let mut poly = Polygon::new();
        poly.tex_format = TextureFormat::Pal256;
        poly.tex_size_s = 2;
        poly.tex_size_t = 2;
        (data, poly)
    }

    #[test]
    fn wrap_and_flip_normalize_s_coordinates() {
        let (data, mut poly) = two_by_two();

        // Clamped: flip has no effect without repeat
        poly.flip_s = true;
        assert_eq!(sample(&data, &poly, -1, 0), pal256_color(1));
        assert_eq!(sample(&data, &poly, 2, 0), pal256_color(2));

        poly.repeat_s = true;
        poly.flip_s = false;
        assert_eq!(sample(&data, &poly, -1, 0), pal256_color(2));
        assert_eq!(sample(&data, &poly, 2, 0), pal256_color(1));

        // A single wrap flips, a double wrap flips back
        poly.flip_s = true;
        assert_eq!(sample(&data, &poly, -1, 0), pal256_color(1));
        assert_eq!(sample(&data, &poly, 2, 0), pal256_color(2));
        assert_eq!(sample(&data, &poly, -2, 0), pal256_color(2));
        assert_eq!(sample(&data, &poly, 4, 0), pal256_color(1));
    }

    #[test]
    fn wrap_and_flip_normalize_t_coordinates() {
        let (data, mut poly) = two_by_two();

        poly.flip_t = true;
        assert_eq!(sample(&data, &poly, 0, -1), pal256_color(1));

        poly.repeat_t = true;
        assert_eq!(sample(&data, &poly, 0, -1), pal256_color(1));
        poly.flip_t = false;
        assert_eq!(sample(&data, &poly, 0, -1), pal256_color(3));
    }

    #[test]
    fn palette_index_0_is_transparent_when_flagged() {
        let (mut data, mut poly) = two_by_two();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.0[..4].copy_from_slice(&[0, 2, 3, 4]);
        data.set_texture_slot(0, Some(&texture));

        poly.transparent_color_0 = true;
        assert_eq!(sample(&data, &poly, 0, 0), 0);
        assert_eq!(sample(&data, &poly, 1, 0), pal256_color(2));

        poly.transparent_color_0 = false;
        assert_eq!(sample(&data, &poly, 0, 0), pal256_color(0));
    }

    #[test]
    fn absent_slots_decode_as_transparent() {
        let (mut data, poly) = two_by_two();
        assert_ne!(sample(&data, &poly, 0, 0), 0);

        data.set_palette_slot(0, None);
        assert_eq!(sample(&data, &poly, 0, 0), 0);

        data.set_texture_slot(0, None);
        assert_eq!(sample(&data, &poly, 0, 0), 0);
    }

    #[test]
    fn a3i5_extends_3_bit_alpha_to_5_bits() {
        let mut data = RenderingData::new();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.0[0] = 7 << 5 | 2;
        texture.0[1] = 3 << 5 | 2;
        data.set_texture_slot(0, Some(&texture));

        let mut palette = zeroed_box::<Bytes<PALETTE_SLOT_LEN>>();
        palette.write_le_u16(4, 0x8000 | 9);
        data.set_palette_slot(0, Some(&palette));

        let mut poly = Polygon::new();
        poly.tex_format = TextureFormat::A3I5;
        poly.tex_size_s = 8;
        poly.tex_size_t = 8;

        // Bit 15 of the palette entry is stripped; alpha3 7 -> alpha5 31,
        // alpha3 3 -> alpha5 13
        assert_eq!(sample(&data, &poly, 0, 0), rgba5_to_rgba6(31 << 15 | 9));
        assert_eq!(sample(&data, &poly, 1, 0), rgba5_to_rgba6(13 << 15 | 9));
    }

    #[test]
    fn a5i3_uses_the_top_5_bits_as_alpha() {
        let mut data = RenderingData::new();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.0[0] = 5 << 3 | 2;
        data.set_texture_slot(0, Some(&texture));

        let mut palette = zeroed_box::<Bytes<PALETTE_SLOT_LEN>>();
        palette.write_le_u16(4, 9);
        data.set_palette_slot(0, Some(&palette));

        let mut poly = Polygon::new();
        poly.tex_format = TextureFormat::A5I3;
        poly.tex_size_s = 8;
        poly.tex_size_t = 8;

        assert_eq!(sample(&data, &poly, 0, 0), rgba5_to_rgba6(5 << 15 | 9));
    }

    #[test]
    fn direct_color_alpha_is_all_or_nothing() {
        let mut data = RenderingData::new();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.write_le_u16(0, 0x8000 | 0x1F);
        texture.write_le_u16(2, 0x1F);
        data.set_texture_slot(0, Some(&texture));

        let mut poly = Polygon::new();
        poly.tex_format = TextureFormat::Direct;
        poly.tex_size_s = 2;
        poly.tex_size_t = 2;

        let opaque = sample(&data, &poly, 0, 0);
        assert_eq!(opaque, 0x3F << 18 | 0x3F);
        let transparent = sample(&data, &poly, 1, 0);
        assert_eq!(transparent >> 18 & 0x3F, 0);
        assert_eq!(transparent & 0x3F, 0x3F);
    }

    // An 8x8 compressed texture whose first tile's rows are all the index
    // pattern 3, 2, 1, 0 (for s = 3, 2, 1, 0), with the given tile palette
    // mode and palette colors 8, 16, 2, 3 at word offset 4.
    fn compressed(mode: u16, tex_slot: usize) -> (RenderingData, Polygon) {
        let mut data = RenderingData::new();

        let mut texture = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        texture.0[..4].copy_from_slice(&[0xE4; 4]);
        data.set_texture_slot(tex_slot, Some(&texture));

        let mut pal_indices = zeroed_box::<Bytes<TEXTURE_SLOT_LEN>>();
        let pal_data_offset = if tex_slot == 2 { 0x1_0000 } else { 0 };
        pal_indices.write_le_u16(pal_data_offset, mode << 14 | 4);
        data.set_texture_slot(1, Some(&pal_indices));

        let mut palette = zeroed_box::<Bytes<PALETTE_SLOT_LEN>>();
        palette.write_le_u16(16, 8);
        palette.write_le_u16(18, 16);
        palette.write_le_u16(20, 2);
        palette.write_le_u16(22, 3);
        data.set_palette_slot(0, Some(&palette));

        let mut poly = Polygon::new();
        poly.tex_format = TextureFormat::Compressed4x4;
        poly.tex_size_s = 8;
        poly.tex_size_t = 8;
        poly.tex_addr = (tex_slot as u32) << 17;
        (data, poly)
    }

    #[test]
    fn compressed_mode_0_direct_colors_with_transparent_3() {
        let (data, poly) = compressed(0, 0);
        assert_eq!(sample(&data, &poly, 0, 0), pal256_color(8));
        assert_eq!(sample(&data, &poly, 1, 0), pal256_color(16));
        assert_eq!(sample(&data, &poly, 2, 0), pal256_color(2));
        assert_eq!(sample(&data, &poly, 3, 0), 0);
    }

    #[test]
    fn compressed_mode_1_interpolates_index_2() {
        let (data, poly) = compressed(1, 0);
        // Halfway between r6 17 (r5 8) and r6 33 (r5 16)
        assert_eq!(sample(&data, &poly, 2, 0), 0x3F << 18 | 25);
        assert_eq!(sample(&data, &poly, 3, 0), 0);
    }

    #[test]
    fn compressed_mode_2_uses_all_four_colors() {
        let (data, poly) = compressed(2, 0);
        assert_eq!(sample(&data, &poly, 3, 0), pal256_color(3));
    }

    #[test]
    fn compressed_mode_3_interpolates_indices_2_and_3() {
        let (data, poly) = compressed(3, 0);
        // 3/8 and 5/8 of the way between r6 17 and r6 33
        assert_eq!(sample(&data, &poly, 2, 0), 0x3F << 18 | 23);
        assert_eq!(sample(&data, &poly, 3, 0), 0x3F << 18 | 27);
    }

    #[test]
    fn compressed_slot_2_reads_palette_bases_from_the_upper_half() {
        let (data, poly) = compressed(2, 2);
        assert_eq!(sample(&data, &poly, 0, 0), pal256_color(8));
    }
}
