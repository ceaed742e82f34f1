// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Display channel.
//!
//! Owns the resizable display region and implements the display-framework
//! callback surface: surface switch, dirty update, refresh, cursor define
//! and pointer motion. The region layout and atomic publish discipline are
//! defined in `juke-protocol`; this module moves the bytes and drives the
//! rendezvous handshake.

use std::ptr;

use log::error;

use juke_protocol::{DisplayHeader, DisplayLayout, InputRing, CURSOR_SLOT_DIM};

use crate::input::{drain_ring, InputSink};
use crate::shmem::ShmRegion;
use crate::transport::Rendezvous;

/// Advisory name of the display region's memfd.
const DISPLAY_SHM_NAME: &str = "juke-fb";

/// A cursor sprite in RGBA8888, rows packed at `width × 4` bytes.
#[derive(Debug, Clone)]
pub struct CursorSprite {
    pub width: u32,
    pub height: u32,
    pub hot_x: i32,
    pub hot_y: i32,
    pub data: Vec<u8>,
}

/// Host console seam.
///
/// The console owns the canonical cursor sprite (the sprite passed to
/// `cursor_define` can lag behind it) and accepts render requests from the
/// refresh tick.
pub trait Console {
    /// The console's current cursor, if any.
    fn cursor(&self) -> Option<CursorSprite>;
    /// Ask the guest graphics to render into the current surface.
    fn request_update(&mut self);
}

/// Borrowed view of the host display surface.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceView<'a> {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
    /// Host pixel-format code, forwarded opaquely to the renderer
    pub format: u32,
    /// `stride × height` bytes of pixel data
    pub data: &'a [u8],
}

/// Display-framework callback surface implemented by [`DisplayChannel`].
pub trait DisplayListener {
    /// The guest resized the surface or changed its format.
    fn gfx_switch(&mut self, surface: &SurfaceView<'_>);
    /// A rectangle of the surface changed.
    fn gfx_update(&mut self, surface: &SurfaceView<'_>, x: u32, y: u32, w: u32, h: u32);
    /// Periodic tick: handshake retry, input drain, render request.
    fn refresh(&mut self);
    /// The cursor sprite changed. The passed sprite may lag; the console's
    /// canonical cursor is authoritative.
    fn cursor_define(&mut self, sprite: Option<&CursorSprite>);
    /// The cursor moved or changed visibility.
    fn mouse_set(&mut self, x: i32, y: i32, visible: bool);
}

struct MappedDisplay {
    shm: ShmRegion,
    layout: DisplayLayout,
}

impl MappedDisplay {
    fn header(&self) -> &DisplayHeader {
        unsafe { &*(self.shm.as_ptr() as *const DisplayHeader) }
    }

    fn ring(&self) -> &InputRing {
        unsafe { &*(self.shm.as_ptr().add(self.layout.ring_offset) as *const InputRing) }
    }

    fn cursor_slot_mut(&mut self) -> &mut [u8] {
        let offset = self.layout.cursor_offset;
        let end = self.layout.ring_offset;
        &mut self.shm.bytes_mut()[offset..end]
    }

    fn pixels(&self) -> &[u8] {
        let offset = self.layout.pixel_offset;
        &self.shm.bytes()[offset..offset + self.layout.pixel_bytes]
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        let offset = self.layout.pixel_offset;
        let end = offset + self.layout.pixel_bytes;
        &mut self.shm.bytes_mut()[offset..end]
    }
}

/// Emulator side of the display shared-memory channel.
///
/// Single-threaded: the host framework invokes every callback on one
/// thread. Cross-process coordination with the renderer happens purely
/// through the atomics in the mapped region.
pub struct DisplayChannel<C: Console, S: InputSink> {
    console: C,
    sink: S,
    transport: Rendezvous,
    region: Option<MappedDisplay>,
    warned_alloc: bool,
}

impl<C: Console, S: InputSink> DisplayChannel<C, S> {
    /// Creates the channel. `socket_path` is the renderer's rendezvous
    /// socket; connecting is retried from `refresh` until it succeeds.
    pub fn new(socket_path: impl Into<std::path::PathBuf>, console: C, sink: S) -> Self {
        DisplayChannel {
            console,
            sink,
            transport: Rendezvous::new("juke-display", socket_path),
            region: None,
            warned_alloc: false,
        }
    }

    /// The mapped header, while a region exists.
    pub fn header(&self) -> Option<&DisplayHeader> {
        self.region.as_ref().map(MappedDisplay::header)
    }

    /// The in-region input ring (renderer-producer view; loopback tests
    /// and in-process renderers push through this).
    pub fn input_ring(&self) -> Option<&InputRing> {
        self.region.as_ref().map(MappedDisplay::ring)
    }

    /// Mutable producer view of the input ring.
    pub fn input_ring_mut(&mut self) -> Option<&mut InputRing> {
        let mapped = self.region.as_mut()?;
        let offset = mapped.layout.ring_offset;
        Some(unsafe { &mut *(mapped.shm.as_mut_ptr().add(offset) as *mut InputRing) })
    }

    /// The shared pixel buffer, while a region exists.
    pub fn pixels(&self) -> Option<&[u8]> {
        self.region.as_ref().map(MappedDisplay::pixels)
    }

    /// The cursor sprite slot, while a region exists.
    pub fn cursor_slot(&self) -> Option<&[u8]> {
        self.region.as_ref().map(|m| {
            &m.shm.bytes()[m.layout.cursor_offset..m.layout.ring_offset]
        })
    }

    /// Allocated region capacity in bytes.
    pub fn region_capacity(&self) -> usize {
        self.region.as_ref().map_or(0, |m| m.shm.len())
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Releases the socket and the region.
    pub fn fini(&mut self) {
        self.transport.close();
        self.region = None;
    }

    fn ensure_region(&mut self, layout: DisplayLayout) -> bool {
        let capacity = self.region.as_ref().map_or(0, |m| m.shm.len());
        if layout.total_size > capacity {
            // Grow-only: replace the region and schedule a fresh fd send.
            if self.region.take().is_some() {
                self.transport.mark_region_replaced();
            }
            match ShmRegion::alloc(DISPLAY_SHM_NAME, layout.total_size) {
                Ok(shm) => {
                    self.region = Some(MappedDisplay { shm, layout });
                    self.warned_alloc = false;
                }
                Err(e) => {
                    if !self.warned_alloc {
                        error!("juke-display: failed to allocate shared region: {}", e);
                        self.warned_alloc = true;
                    }
                    return false;
                }
            }
        } else if let Some(mapped) = self.region.as_mut() {
            mapped.layout = layout;
        }
        self.region.is_some()
    }

    fn drain_input(&mut self) {
        let Some(mapped) = self.region.as_ref() else {
            return;
        };
        let header = mapped.header();
        let (width, height) = (header.width, header.height);
        drain_ring(mapped.ring(), width, height, &mut self.sink);
    }
}

impl<C: Console, S: InputSink> DisplayListener for DisplayChannel<C, S> {
    fn gfx_switch(&mut self, surface: &SurfaceView<'_>) {
        let layout = DisplayLayout::new(surface.stride, surface.height);
        if !self.ensure_region(layout) {
            return;
        }
        let Some(mapped) = self.region.as_mut() else {
            return;
        };
        unsafe {
            ptr::write(
                mapped.shm.as_mut_ptr() as *mut DisplayHeader,
                DisplayHeader::new(surface.width, surface.height, surface.stride, surface.format),
            );
        }
        mapped.ring().reset();
        let pixels = mapped.pixels_mut();
        let len = pixels.len().min(surface.data.len());
        pixels[..len].copy_from_slice(&surface.data[..len]);

        if let Some(mapped) = &self.region {
            self.transport.send_fd(mapped.shm.fd());
        }
    }

    fn gfx_update(&mut self, surface: &SurfaceView<'_>, x: u32, y: u32, w: u32, h: u32) {
        let Some(mapped) = self.region.as_mut() else {
            return;
        };

        // Copy whole rows at surface stride; the dirty rectangle narrows
        // the renderer's repaint, not the copy.
        let stride = surface.stride as usize;
        let y0 = y.min(surface.height) as usize;
        let y1 = y.saturating_add(h).min(surface.height) as usize;
        let pixels = mapped.pixels_mut();
        let begin = (y0 * stride).min(pixels.len()).min(surface.data.len());
        let end = (y1 * stride).min(pixels.len()).min(surface.data.len());
        pixels[begin..end].copy_from_slice(&surface.data[begin..end]);

        mapped.header().publish_update(x, y, w, h);
    }

    fn refresh(&mut self) {
        if !self.transport.is_connected() {
            self.transport.poll_connect();
        }
        if let Some(mapped) = &self.region {
            self.transport.send_fd(mapped.shm.fd());
        }
        self.drain_input();
        self.console.request_update();
    }

    fn cursor_define(&mut self, _sprite: Option<&CursorSprite>) {
        // The passed sprite can lag; the console's cursor is canonical.
        let cursor = self.console.cursor();
        let Some(mapped) = self.region.as_mut() else {
            return;
        };

        match cursor {
            Some(sprite) => {
                let width = sprite.width.min(CURSOR_SLOT_DIM);
                let height = sprite.height.min(CURSOR_SLOT_DIM);
                let src_stride = sprite.width as usize * 4;
                let dst_stride = CURSOR_SLOT_DIM as usize * 4;
                let row_bytes = width as usize * 4;

                let slot = mapped.cursor_slot_mut();
                for row in 0..height as usize {
                    let src = row * src_stride;
                    let dst = row * dst_stride;
                    if src + row_bytes > sprite.data.len() {
                        break;
                    }
                    slot[dst..dst + row_bytes].copy_from_slice(&sprite.data[src..src + row_bytes]);
                }
                mapped
                    .header()
                    .set_cursor_shape(width, height, sprite.hot_x, sprite.hot_y);
            }
            None => {
                // Still bump the version so the renderer clears its cache.
                mapped.header().clear_cursor_shape();
            }
        }
    }

    fn mouse_set(&mut self, x: i32, y: i32, visible: bool) {
        if let Some(mapped) = &self.region {
            mapped.header().set_pointer(x, y, visible);
        }
    }
}

impl<C: Console, S: InputSink> Drop for DisplayChannel<C, S> {
    fn drop(&mut self) {
        self.fini();
    }
}
