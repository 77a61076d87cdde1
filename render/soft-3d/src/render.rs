mod texture;
mod utils;

use crate::data::RenderingData;
use prism_core::gpu::{
    engine_3d::{Polygon, PolygonMode, TextureFormat, Vertex, PIXEL_3D_BIT},
    Scanline, SCREEN_WIDTH, TILE_HEIGHT,
};
use utils::{interp, interp_color, interp_color_persp, interp_persp, interp_w, normalize_ws};

/// Rasterizes scanlines into one 48-line tile's worth of row buffers.
///
/// The depth, attribute and stencil buffers are cleared at the tile's first
/// scanline and shared by the rest of the tile, so cross-line state such as
/// shadow stencil marks survives within a tile.
#[derive(Clone, Copy)]
pub(crate) struct RawRenderer {
    depth_buffer: Scanline<u32>,
    attr_buffer: Scanline<u8>,
    stencil_buffer: Scanline<bool>,
}

/// Polygons whose vertices are all fully opaque draw in a first pass; the
/// rest (including the inherently translucent A3I5/A5I3 formats) draw after
/// them, both passes in submission order.
fn is_translucent(poly: &Polygon) -> bool {
    poly.vertices[..poly.vertices_len as usize]
        .iter()
        .any(|vert| vert.color >> 18 < 0x3F)
        || matches!(poly.tex_format, TextureFormat::A3I5 | TextureFormat::A5I3)
}

/// The "equal" mode reproduces the hardware's asymmetric test: the margin
/// only opens up through the unsigned wrap when the buffered depth is below
/// 0x200.
fn depth_test(test_equal: bool, buffered: u32, depth: u32) -> bool {
    (test_equal && buffered.wrapping_sub(0x200) >= depth) || buffered > depth
}

fn modulate(texel: u32, color: u32) -> u32 {
    let r = (((texel & 0x3F) + 1) * ((color & 0x3F) + 1) - 1) / 64;
    let g = (((texel >> 6 & 0x3F) + 1) * ((color >> 6 & 0x3F) + 1) - 1) / 64;
    let b = (((texel >> 12 & 0x3F) + 1) * ((color >> 12 & 0x3F) + 1) - 1) / 64;
    let a = (((texel >> 18 & 0x3F) + 1) * ((color >> 18 & 0x3F) + 1) - 1) / 64;
    a << 18 | b << 12 | g << 6 | r
}

fn decal(texel: u32, color: u32) -> u32 {
    let ta = texel >> 18 & 0x3F;
    let r = ((texel & 0x3F) * ta + (color & 0x3F) * (63 - ta)) / 64;
    let g = ((texel >> 6 & 0x3F) * ta + (color >> 6 & 0x3F) * (63 - ta)) / 64;
    let b = ((texel >> 12 & 0x3F) * ta + (color >> 12 & 0x3F) * (63 - ta)) / 64;
    let a = color >> 18 & 0x3F;
    a << 18 | b << 12 | g << 6 | r
}

impl RawRenderer {
    pub const fn new() -> Self {
        RawRenderer {
            depth_buffer: Scanline([0; SCREEN_WIDTH]),
            attr_buffer: Scanline([0; SCREEN_WIDTH]),
            stencil_buffer: Scanline([false; SCREEN_WIDTH]),
        }
    }

    pub fn render_scanline(&mut self, data: &RenderingData, fb_line: &mut Scanline<u32>, line: u8) {
        fb_line.0.fill(data.state.clear_color);

        if line as usize % TILE_HEIGHT == 0 {
            self.depth_buffer.0.fill(data.state.clear_depth);
            self.attr_buffer.0.fill(0);
            self.stencil_buffer.0.fill(false);
        }

        for poly in data.polygons().iter().filter(|poly| !is_translucent(poly)) {
            self.draw_polygon(data, fb_line, line, poly);
        }
        for poly in data.polygons().iter().filter(|poly| is_translucent(poly)) {
            self.draw_polygon(data, fb_line, line, poly);
        }
    }

    fn draw_polygon(
        &mut self,
        data: &RenderingData,
        fb_line: &mut Scanline<u32>,
        line: u8,
        poly: &Polygon,
    ) {
        let line = line as i32;
        let len = poly.vertices_len as usize;

        // Sort vertex indices by increasing Y, then increasing X
        let mut order = [0, 1, 2, 3, 4, 5, 6, 7];
        order[..len].sort_unstable_by_key(|&i| {
            let vert = &poly.vertices[i];
            (vert.y, vert.x)
        });
        let vert = |i: usize| &poly.vertices[order[i]];

        if line < vert(0).y || line >= vert(len - 1).y {
            return;
        }

        // Cross products of the middle vertices against the edge from the
        // topmost to the bottommost vertex: positive lies on the right of
        // the polygon, non-positive on the left
        let mut crosses = [0; 6];
        for j in 1..len - 1 {
            crosses[j - 1] = (vert(j).x - vert(0).x) * (vert(len - 1).y - vert(0).y)
                - (vert(j).y - vert(0).y) * (vert(len - 1).x - vert(0).x);
        }

        for j in 1..len {
            if line < vert(j).y {
                // Bottom-left vertex: the highest vertex at or below j on
                // the left side
                let mut v2 = j;
                while v2 < len - 1 && crosses[v2 - 1] > 0 {
                    v2 += 1;
                }

                // Top-left vertex: the lowest vertex above v2 on the left
                // side, collapsing horizontal runs
                let mut v1 = v2 - 1;
                loop {
                    while v1 > 0 && vert(v1).y == vert(v1 - 1).y {
                        v1 -= 1;
                    }
                    if v1 == 0 || crosses[v1 - 1] <= 0 {
                        break;
                    }
                    v1 -= 1;
                }

                // Bottom-right vertex: the highest vertex at or below j on
                // the right side, collapsing horizontal runs
                let mut v4 = j;
                loop {
                    while v4 < len - 1 && vert(v4).y == vert(v4 + 1).y {
                        v4 += 1;
                    }
                    if v4 == len - 1 || crosses[v4 - 1] > 0 {
                        break;
                    }
                    v4 += 1;
                }

                // Top-right vertex: the lowest vertex above v4 on the right
                // side
                let mut v3 = v4 - 1;
                loop {
                    while v3 > 0 && vert(v3).y == vert(v4).y {
                        v3 -= 1;
                    }
                    if v3 == 0 || crosses[v3 - 1] > 0 {
                        break;
                    }
                    v3 -= 1;
                }

                self.rasterize(data, fb_line, line, poly, vert(v1), vert(v2), vert(v3), vert(v4));
                break;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rasterize(
        &mut self,
        data: &RenderingData,
        fb_line: &mut Scanline<u32>,
        line: i32,
        poly: &Polygon,
        v1: &Vertex,
        v2: &Vertex,
        v3: &Vertex,
        v4: &Vertex,
    ) {
        // Horizontal runs were collapsed during edge selection; an edge with
        // a zero Y extent here would divide by zero, so drop the polygon
        if v2.y <= v1.y || v4.y <= v3.y {
            return;
        }

        let mut vw = [v1.w as i64, v2.w as i64, v3.w as i64, v4.w as i64];
        let w_shift = normalize_ws(&mut vw);

        // X bounds of the polygon on the current line
        let x1 = interp(v1.x as i64, v2.x as i64, v1.y, line, v2.y);
        let x2 = interp(v3.x as i64, v4.x as i64, v3.y, line, v4.y);

        let (z1, z2) = if poly.w_buffer {
            (0, 0)
        } else {
            (
                interp(v1.z as i64, v2.z as i64, v1.y, line, v2.y),
                interp(v3.z as i64, v4.z as i64, v3.y, line, v4.y),
            )
        };

        let w1 = interp_w(vw[0], vw[1], v1.y, line, v2.y);
        let w2 = interp_w(vw[2], vw[3], v3.y, line, v4.y);

        // Color and texture coordinates along the edges are only needed once
        // a pixel survives the depth test
        let mut edge_colors = None;
        let mut edge_uvs = None;

        for x in x1.max(0)..x2.min(SCREEN_WIDTH as i32) {
            let depth = if poly.w_buffer {
                (interp_w(w1 as i64, w2 as i64, x1, x, x2) << w_shift) as u32
            } else {
                interp(z1 as i64, z2 as i64, x1, x, x2) as u32
            };

            let xi = x as usize;
            if !depth_test(poly.depth_test_equal, self.depth_buffer.0[xi], depth) {
                continue;
            }

            if poly.mode == PolygonMode::Shadow {
                if poly.id == 0 {
                    // ID 0 is the shadow mask: it only marks the stencil
                    self.stencil_buffer.0[xi] = true;
                    continue;
                } else if self.stencil_buffer.0[xi] || self.attr_buffer.0[xi] == poly.id {
                    // Other IDs only render where the stencil is clear and
                    // the pixel wasn't drawn by the same polygon ID
                    self.stencil_buffer.0[xi] = false;
                    continue;
                }
            }

            let (c1, c2) = *edge_colors.get_or_insert_with(|| {
                (
                    interp_color_persp(
                        v1.color, v2.color, v1.y, line, v2.y, vw[0] as i32, vw[1] as i32,
                    ),
                    interp_color_persp(
                        v3.color, v4.color, v3.y, line, v4.y, vw[2] as i32, vw[3] as i32,
                    ),
                )
            });

            let mut color = interp_color_persp(c1, c2, x1, x, x2, w1, w2);

            if poly.tex_format != TextureFormat::None {
                let (s1, s2, t1, t2) = *edge_uvs.get_or_insert_with(|| {
                    (
                        interp_persp(
                            v1.s as i64, v2.s as i64, v1.y, line, v2.y, vw[0] as i32, vw[1] as i32,
                        ),
                        interp_persp(
                            v3.s as i64, v4.s as i64, v3.y, line, v4.y, vw[2] as i32, vw[3] as i32,
                        ),
                        interp_persp(
                            v1.t as i64, v2.t as i64, v1.y, line, v2.y, vw[0] as i32, vw[1] as i32,
                        ),
                        interp_persp(
                            v3.t as i64, v4.t as i64, v3.y, line, v4.y, vw[2] as i32, vw[3] as i32,
                        ),
                    )
                });

                let s = interp_persp(s1 as i64, s2 as i64, x1, x, x2, w1, w2);
                let t = interp_persp(t1 as i64, t2 as i64, x1, x, x2, w1, w2);
                let texel = texture::sample(data, poly, s >> 4, t >> 4);

                color = match poly.mode {
                    PolygonMode::Modulation => modulate(texel, color),
                    PolygonMode::Decal | PolygonMode::Shadow => decal(texel, color),
                    PolygonMode::ToonHighlight => {
                        let toon = data.state.toon_table[((color & 0x3F) >> 1) as usize];
                        let mut r = (((texel & 0x3F) + 1) * ((toon & 0x3F) + 1) - 1) / 64;
                        let mut g = (((texel >> 6 & 0x3F) + 1) * ((toon >> 6 & 0x3F) + 1) - 1) / 64;
                        let mut b =
                            (((texel >> 12 & 0x3F) + 1) * ((toon >> 12 & 0x3F) + 1) - 1) / 64;
                        let a = (((texel >> 18 & 0x3F) + 1) * ((color >> 18 & 0x3F) + 1) - 1) / 64;

                        if data.state.control.highlight_shading_enabled() {
                            r = (r + (toon & 0x3F)).min(0x3F);
                            g = (g + (toon >> 6 & 0x3F)).min(0x3F);
                            b = (b + (toon >> 12 & 0x3F)).min(0x3F);
                        }

                        a << 18 | b << 12 | g << 6 | r
                    }
                };
            }

            // Pixels with zero alpha are discarded; translucent pixels blend
            // over already-written 3D pixels and only update the depth
            // buffer when the polygon requests it
            if color & 0xFC_0000 != 0 {
                let pixel = &mut fb_line.0[xi];
                if color >> 18 < 0x3F && *pixel & 0xFC_0000 != 0 {
                    *pixel = PIXEL_3D_BIT | interp_color(*pixel, color, 0, (color >> 18) as i32, 63);
                    if poly.update_depth_for_translucent {
                        self.depth_buffer.0[xi] = depth;
                    }
                } else {
                    *pixel = PIXEL_3D_BIT | color;
                    self.depth_buffer.0[xi] = depth;
                }
                self.attr_buffer.0[xi] = poly.id;
            }
        }
    }
}
