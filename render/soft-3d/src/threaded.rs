use crate::{data::RenderingData, render::RawRenderer};
use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};
use prism_core::{
    gpu::{Framebuffer, Scanline, TILES, TILE_HEIGHT},
    utils::zeroed_box,
};
use std::{sync::Arc, thread};

pub mod tile_state {
    pub const DONE: u8 = 0;
    pub const PENDING: u8 = 1;
    pub const RENDERING: u8 = 2;
}

pub struct SharedData {
    pub rendering_data: UnsafeCell<RenderingData>,
    pub framebuffer: Box<UnsafeCell<Framebuffer>>,
    pub tile_states: [AtomicU8; TILES],
    pub stopped: AtomicBool,
}

// Access is coordinated through `tile_states`: the host only mutates
// `rendering_data` while every tile is done, and each worker only writes
// its own tile's framebuffer rows.
unsafe impl Sync for SharedData {}

impl SharedData {
    pub fn new() -> Self {
        SharedData {
            rendering_data: UnsafeCell::new(RenderingData::new()),
            framebuffer: zeroed_box(),
            tile_states: core::array::from_fn(|_| AtomicU8::new(tile_state::DONE)),
            stopped: AtomicBool::new(false),
        }
    }
}

/// Spawns the long-lived worker for one 48-line tile. The worker parks
/// until its tile is marked pending, renders the tile's scanlines in order
/// and publishes completion.
pub fn spawn_worker(tile: usize, shared: Arc<SharedData>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("3D rendering (tile {tile})"))
        .spawn(move || {
            let mut raw = RawRenderer::new();
            loop {
                if shared.stopped.load(Ordering::Relaxed) {
                    return;
                }
                if shared.tile_states[tile]
                    .compare_exchange(
                        tile_state::PENDING,
                        tile_state::RENDERING,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let rendering_data = unsafe { &*shared.rendering_data.get() };
                    let fb_lines = shared.framebuffer.get().cast::<Scanline<u32>>();
                    for line in tile * TILE_HEIGHT..(tile + 1) * TILE_HEIGHT {
                        let fb_line = unsafe { &mut *fb_lines.add(line) };
                        raw.render_scanline(rendering_data, fb_line, line as u8);
                    }
                    shared.tile_states[tile].store(tile_state::DONE, Ordering::Release);
                } else {
                    thread::park();
                }
            }
        })
        .expect("couldn't spawn 3D rendering thread")
}
