// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Display region header and layout.
//!
//! The display region is resized on surface switch and carries, in order:
//! the header, a fixed 64×64 RGBA cursor sprite slot, the renderer-fed
//! input ring, and the pixel buffer. The `frame_counter` is the single
//! commit anchor for pixel and dirty-rectangle data; `cursor_version` is
//! the anchor for cursor shape data.

use std::sync::atomic::{fence, AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::input::InputRing;

/// Magic number for display header validation: "JUKE" little-endian.
pub const DISPLAY_MAGIC: u32 = 0x454B554A;

/// Current display protocol version (v3 adds cursor + input over v1).
pub const DISPLAY_VERSION: u32 = 3;

/// Cursor sprite slot dimension in pixels (width and height).
pub const CURSOR_SLOT_DIM: u32 = 64;

/// Cursor sprite slot size in bytes (64×64 RGBA8888).
pub const CURSOR_SLOT_BYTES: usize = (CURSOR_SLOT_DIM * CURSOR_SLOT_DIM * 4) as usize;

/// Display region header (fixed size, at the start of shared memory).
///
/// `magic`, `version`, the surface dimensions and `format` are written at
/// region init and never mutated afterwards. Everything else is an
/// independent single-word atomic owned by the emulator; the renderer only
/// reads them.
///
/// # Synchronization
///
/// - `frame_counter`: release-incremented after the dirty rectangle and
///   pixel rows are in place; acquire-load it before reading either.
/// - `cursor_version`: release-incremented after sprite pixels and shape
///   metadata are in place; acquire-load it before reading them.
/// - `cursor_x`/`cursor_y`/`cursor_visible`: best-effort position, ordered
///   only by the release fence in the setter.
#[repr(C)]
#[derive(Debug)]
pub struct DisplayHeader {
    /// Magic number for validation (`DISPLAY_MAGIC`)
    pub magic: u32,
    /// Protocol version (`DISPLAY_VERSION`)
    pub version: u32,
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
    /// Surface stride in bytes
    pub stride: u32,
    /// Host pixel-format code (opaque, agreed with the renderer)
    pub format: u32,
    /// Incremented on every dirty-update publish
    pub frame_counter: AtomicU64,
    /// Bounding box of the most recent update, valid iff `frame_counter`
    /// changed since the last read
    pub dirty_x: AtomicU32,
    pub dirty_y: AtomicU32,
    pub dirty_w: AtomicU32,
    pub dirty_h: AtomicU32,
    /// Incremented whenever the cursor sprite shape changes
    pub cursor_version: AtomicU32,
    /// Cursor position in surface coordinates
    pub cursor_x: AtomicI32,
    pub cursor_y: AtomicI32,
    /// 0 = hidden, 1 = visible
    pub cursor_visible: AtomicU32,
    /// Valid sprite window inside the slot, 0..=64 each; 0×0 = no cursor
    pub cursor_width: AtomicU32,
    pub cursor_height: AtomicU32,
    /// Hotspot offset inside the sprite
    pub cursor_hot_x: AtomicI32,
    pub cursor_hot_y: AtomicI32,
}

impl DisplayHeader {
    /// Creates a header for a freshly switched surface.
    ///
    /// The dirty rectangle starts as the full surface so a renderer that
    /// attaches late repaints everything.
    pub fn new(width: u32, height: u32, stride: u32, format: u32) -> Self {
        DisplayHeader {
            magic: DISPLAY_MAGIC,
            version: DISPLAY_VERSION,
            width,
            height,
            stride,
            format,
            frame_counter: AtomicU64::new(0),
            dirty_x: AtomicU32::new(0),
            dirty_y: AtomicU32::new(0),
            dirty_w: AtomicU32::new(width),
            dirty_h: AtomicU32::new(height),
            cursor_version: AtomicU32::new(0),
            cursor_x: AtomicI32::new(0),
            cursor_y: AtomicI32::new(0),
            cursor_visible: AtomicU32::new(0),
            cursor_width: AtomicU32::new(0),
            cursor_height: AtomicU32::new(0),
            cursor_hot_x: AtomicI32::new(0),
            cursor_hot_y: AtomicI32::new(0),
        }
    }

    /// Validates the header magic number and version.
    pub fn validate(&self) -> bool {
        self.magic == DISPLAY_MAGIC && self.version == DISPLAY_VERSION
    }

    /// Gets the current frame counter.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    /// Publishes a dirty rectangle and returns the new frame counter.
    ///
    /// The pixel rows must already be written. The release increment makes
    /// them and the rectangle visible to a renderer that acquire-loads the
    /// counter.
    pub fn publish_update(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        self.dirty_x.store(x, Ordering::Relaxed);
        self.dirty_y.store(y, Ordering::Relaxed);
        self.dirty_w.store(w, Ordering::Relaxed);
        self.dirty_h.store(h, Ordering::Relaxed);
        self.frame_counter.fetch_add(1, Ordering::Release) + 1
    }

    /// Gets the most recently published dirty rectangle as `(x, y, w, h)`.
    pub fn dirty_rect(&self) -> (u32, u32, u32, u32) {
        (
            self.dirty_x.load(Ordering::Relaxed),
            self.dirty_y.load(Ordering::Relaxed),
            self.dirty_w.load(Ordering::Relaxed),
            self.dirty_h.load(Ordering::Relaxed),
        )
    }

    /// Gets the cursor shape version.
    pub fn cursor_version(&self) -> u32 {
        self.cursor_version.load(Ordering::Acquire)
    }

    /// Publishes new cursor shape metadata and returns the new version.
    ///
    /// The sprite pixels must already be written to the cursor slot.
    pub fn set_cursor_shape(&self, width: u32, height: u32, hot_x: i32, hot_y: i32) -> u32 {
        self.cursor_width.store(width, Ordering::Relaxed);
        self.cursor_height.store(height, Ordering::Relaxed);
        self.cursor_hot_x.store(hot_x, Ordering::Relaxed);
        self.cursor_hot_y.store(hot_y, Ordering::Relaxed);
        self.cursor_version.fetch_add(1, Ordering::Release) + 1
    }

    /// Clears the cursor shape (0×0 sprite) and returns the new version.
    ///
    /// The version still advances so the renderer drops its cached sprite.
    pub fn clear_cursor_shape(&self) -> u32 {
        self.set_cursor_shape(0, 0, 0, 0)
    }

    /// Gets the valid sprite window as `(width, height)`.
    pub fn cursor_size(&self) -> (u32, u32) {
        (
            self.cursor_width.load(Ordering::Relaxed),
            self.cursor_height.load(Ordering::Relaxed),
        )
    }

    /// Gets the sprite hotspot as `(x, y)`.
    pub fn cursor_hotspot(&self) -> (i32, i32) {
        (
            self.cursor_hot_x.load(Ordering::Relaxed),
            self.cursor_hot_y.load(Ordering::Relaxed),
        )
    }

    /// Updates the cursor position and visibility.
    ///
    /// Position is best-effort for the renderer; the shape version is the
    /// only ordering anchor, so no version bump here.
    pub fn set_pointer(&self, x: i32, y: i32, visible: bool) {
        self.cursor_x.store(x, Ordering::Relaxed);
        self.cursor_y.store(y, Ordering::Relaxed);
        self.cursor_visible
            .store(u32::from(visible), Ordering::Relaxed);
        fence(Ordering::Release);
    }

    /// Gets the cursor position and visibility as `(x, y, visible)`.
    pub fn pointer(&self) -> (i32, i32, bool) {
        (
            self.cursor_x.load(Ordering::Relaxed),
            self.cursor_y.load(Ordering::Relaxed),
            self.cursor_visible.load(Ordering::Relaxed) != 0,
        )
    }
}

/// Display region layout calculator.
///
/// Offsets are fixed except for the total size, which follows the pixel
/// buffer (`stride × height`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayLayout {
    /// Offset to the cursor sprite slot
    pub cursor_offset: usize,
    /// Offset to the input ring
    pub ring_offset: usize,
    /// Offset to the pixel buffer
    pub pixel_offset: usize,
    /// Pixel buffer size in bytes
    pub pixel_bytes: usize,
    /// Total region size in bytes
    pub total_size: usize,
}

impl DisplayLayout {
    /// Size of the header in bytes.
    pub const HEADER_SIZE: usize = 80;

    /// Size of the input ring in bytes.
    pub const RING_SIZE: usize = std::mem::size_of::<InputRing>();

    /// Creates the layout for a surface with the given stride and height.
    pub fn new(stride: u32, height: u32) -> Self {
        let cursor_offset = Self::HEADER_SIZE;
        let ring_offset = cursor_offset + CURSOR_SLOT_BYTES;
        let pixel_offset = ring_offset + Self::RING_SIZE;
        let pixel_bytes = stride as usize * height as usize;
        DisplayLayout {
            cursor_offset,
            ring_offset,
            pixel_offset,
            pixel_bytes,
            total_size: pixel_offset + pixel_bytes,
        }
    }

    /// Validates that a region of `region_size` bytes can hold this layout.
    pub fn validate_region_size(&self, region_size: usize) -> bool {
        region_size >= self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_is_abi() {
        assert_eq!(
            std::mem::size_of::<DisplayHeader>(),
            DisplayLayout::HEADER_SIZE
        );
    }

    #[test]
    fn test_layout_offsets() {
        let layout = DisplayLayout::new(3200, 600);
        assert_eq!(layout.cursor_offset, 80);
        assert_eq!(layout.ring_offset, 80 + CURSOR_SLOT_BYTES);
        assert_eq!(layout.pixel_offset, layout.ring_offset + DisplayLayout::RING_SIZE);
        assert_eq!(layout.pixel_bytes, 3200 * 600);
        assert_eq!(layout.total_size, layout.pixel_offset + 3200 * 600);
        // The event array inside the ring must land on a 16-byte boundary.
        assert_eq!((layout.ring_offset + 16) % 16, 0);
    }

    #[test]
    fn test_layout_validate_region_size() {
        let layout = DisplayLayout::new(1024, 256);
        assert!(layout.validate_region_size(layout.total_size));
        assert!(layout.validate_region_size(layout.total_size + 4096));
        assert!(!layout.validate_region_size(layout.total_size - 1));
    }

    #[test]
    fn test_header_validation() {
        let header = DisplayHeader::new(800, 600, 3200, 0x20020888);
        assert!(header.validate());
        assert_eq!(header.magic, DISPLAY_MAGIC);
        assert_eq!(header.version, DISPLAY_VERSION);
        assert_eq!(header.width, 800);
        assert_eq!(header.height, 600);
        assert_eq!(header.stride, 3200);
    }

    #[test]
    fn test_initial_dirty_rect_covers_surface() {
        let header = DisplayHeader::new(800, 600, 3200, 0);
        assert_eq!(header.dirty_rect(), (0, 0, 800, 600));
        assert_eq!(header.frame_counter(), 0);
    }

    #[test]
    fn test_publish_update() {
        let header = DisplayHeader::new(800, 600, 3200, 0);
        assert_eq!(header.publish_update(10, 20, 30, 40), 1);
        assert_eq!(header.dirty_rect(), (10, 20, 30, 40));
        assert_eq!(header.frame_counter(), 1);
        assert_eq!(header.publish_update(0, 0, 800, 600), 2);
        assert_eq!(header.frame_counter(), 2);
    }

    #[test]
    fn test_cursor_shape_version_monotone() {
        let header = DisplayHeader::new(800, 600, 3200, 0);
        assert_eq!(header.cursor_version(), 0);
        assert_eq!(header.set_cursor_shape(24, 24, 3, 3), 1);
        assert_eq!(header.cursor_size(), (24, 24));
        assert_eq!(header.cursor_hotspot(), (3, 3));
        // A null cursor clears the dimensions but still advances.
        assert_eq!(header.clear_cursor_shape(), 2);
        assert_eq!(header.cursor_size(), (0, 0));
        assert_eq!(header.cursor_version(), 2);
    }

    #[test]
    fn test_pointer_no_version_bump() {
        let header = DisplayHeader::new(800, 600, 3200, 0);
        header.set_pointer(101, -7, true);
        assert_eq!(header.pointer(), (101, -7, true));
        assert_eq!(header.cursor_version(), 0);
        header.set_pointer(0, 0, false);
        assert_eq!(header.pointer(), (0, 0, false));
    }
}
