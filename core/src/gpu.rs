pub mod engine_3d;

use crate::utils::Zero;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 192;

/// The renderer works on horizontal strips of the screen, matching the
/// hardware's 48-line rendering cache.
pub const TILE_HEIGHT: usize = 48;
pub const TILES: usize = SCREEN_HEIGHT / TILE_HEIGHT;

#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct Scanline<T, const LEN: usize = SCREEN_WIDTH>(pub [T; LEN]);

unsafe impl<T: Zero, const LEN: usize> Zero for Scanline<T, LEN> {}

pub type Framebuffer = [Scanline<u32>; SCREEN_HEIGHT];
