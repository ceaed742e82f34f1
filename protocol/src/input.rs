// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Renderer-to-emulator input ring.
//!
//! The ring lives inside the display region between the cursor slot and the
//! pixel buffer. The renderer is the producer (`write_idx`), the emulator is
//! the consumer (`read_idx`). Both indices are unbounded u32 counters; the
//! capacity divides 2³², so unsigned modular subtraction yields the pending
//! count and `idx & (capacity − 1)` yields the slot.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Input event kind carried in [`InputEvent::kind`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEventKind {
    /// `x`/`y` are movement deltas
    MouseRelative = 1,
    /// `x`/`y` are absolute surface coordinates
    MouseAbsolute = 2,
    /// `button` identifies the button, `pressed` is 0/1
    MouseButton = 3,
    /// `x` is a scancode, `pressed` is 0/1, `y` unused
    Key = 4,
}

impl TryFrom<u8> for InputEventKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InputEventKind::MouseRelative),
            2 => Ok(InputEventKind::MouseAbsolute),
            3 => Ok(InputEventKind::MouseButton),
            4 => Ok(InputEventKind::Key),
            _ => Err("Invalid input event kind"),
        }
    }
}

/// Mouse button identifier carried in [`InputEvent::button`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left = 0,
    Middle = 1,
    Right = 2,
    /// Side button (typically back)
    Side = 3,
    /// Extra button (typically forward)
    Extra = 4,
}

impl TryFrom<u8> for MouseButton {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MouseButton::Left),
            1 => Ok(MouseButton::Middle),
            2 => Ok(MouseButton::Right),
            3 => Ok(MouseButton::Side),
            4 => Ok(MouseButton::Extra),
            _ => Err("Invalid mouse button value"),
        }
    }
}

/// A single 12-byte input event slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Event kind (see [`InputEventKind`])
    pub kind: u8,
    /// Mouse button code for [`InputEventKind::MouseButton`]
    pub button: u8,
    /// 0 = released, 1 = pressed
    pub pressed: u8,
    /// Reserved, must be 0
    pub reserved: u8,
    /// Delta, coordinate, or scancode depending on `kind`
    pub x: i32,
    /// Delta or coordinate depending on `kind`
    pub y: i32,
}

impl InputEvent {
    /// All-zero slot, the state of a freshly allocated ring.
    pub const ZERO: InputEvent = InputEvent {
        kind: 0,
        button: 0,
        pressed: 0,
        reserved: 0,
        x: 0,
        y: 0,
    };

    /// Creates a relative mouse movement event.
    pub fn mouse_relative(dx: i32, dy: i32) -> Self {
        InputEvent {
            kind: InputEventKind::MouseRelative as u8,
            x: dx,
            y: dy,
            ..Self::ZERO
        }
    }

    /// Creates an absolute mouse position event.
    pub fn mouse_absolute(x: i32, y: i32) -> Self {
        InputEvent {
            kind: InputEventKind::MouseAbsolute as u8,
            x,
            y,
            ..Self::ZERO
        }
    }

    /// Creates a mouse button event.
    pub fn mouse_button(button: MouseButton, pressed: bool) -> Self {
        InputEvent {
            kind: InputEventKind::MouseButton as u8,
            button: button as u8,
            pressed: u8::from(pressed),
            ..Self::ZERO
        }
    }

    /// Creates a key event from a scancode.
    pub fn key(scancode: u32, pressed: bool) -> Self {
        InputEvent {
            kind: InputEventKind::Key as u8,
            pressed: u8::from(pressed),
            x: scancode as i32,
            ..Self::ZERO
        }
    }

    /// Decodes the event kind.
    pub fn event_kind(&self) -> Result<InputEventKind, &'static str> {
        InputEventKind::try_from(self.kind)
    }
}

/// Fixed-capacity input ring shared with the renderer.
///
/// The 8 padding bytes after the indices align the event array to 16 bytes
/// from the start of the ring.
#[repr(C)]
#[derive(Debug)]
pub struct InputRing {
    /// Producer-owned (renderer)
    pub write_idx: AtomicU32,
    /// Consumer-owned (emulator)
    pub read_idx: AtomicU32,
    _pad: [u32; 2],
    /// Event slots, indexed by `idx & (CAPACITY − 1)`
    pub events: [InputEvent; InputRing::CAPACITY as usize],
}

impl InputRing {
    /// Ring capacity in events. Must divide 2³² so that unsigned modular
    /// index subtraction stays meaningful across wraps.
    pub const CAPACITY: u32 = 256;

    const MASK: u32 = Self::CAPACITY - 1;

    /// Creates an empty ring (for stack construction in tests; in the
    /// shared region the ring starts life as zero-filled memory).
    pub fn new() -> Self {
        InputRing {
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            _pad: [0; 2],
            events: [InputEvent::ZERO; Self::CAPACITY as usize],
        }
    }

    /// Resets both indices, abandoning any pending events.
    pub fn reset(&self) {
        self.write_idx.store(0, Ordering::Relaxed);
        self.read_idx.store(0, Ordering::Relaxed);
    }

    /// Producer-side push. Refuses to overwrite unconsumed slots, which
    /// also keeps the index distance far below the 2³¹ reversal bound.
    pub fn push(&mut self, event: InputEvent) -> bool {
        let w = self.write_idx.load(Ordering::Relaxed);
        let r = self.read_idx.load(Ordering::Acquire);
        if w.wrapping_sub(r) >= Self::CAPACITY {
            return false;
        }
        self.events[(w & Self::MASK) as usize] = event;
        self.write_idx.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    /// Acquire-loads the producer index; slots below it are readable.
    pub fn producer_index(&self) -> u32 {
        self.write_idx.load(Ordering::Acquire)
    }

    /// Loads the consumer index. The emulator owns it, so no ordering is
    /// needed on its own reads.
    pub fn consumer_index(&self) -> u32 {
        self.read_idx.load(Ordering::Relaxed)
    }

    /// Number of events waiting to be consumed.
    pub fn pending(&self) -> u32 {
        self.producer_index().wrapping_sub(self.consumer_index())
    }

    /// Copies out the event at an unbounded index.
    pub fn event_at(&self, idx: u32) -> InputEvent {
        self.events[(idx & Self::MASK) as usize]
    }

    /// Release-publishes the consumer index after a drain.
    pub fn commit_read(&self, idx: u32) {
        self.read_idx.store(idx, Ordering::Release);
    }
}

impl Default for InputRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_12_bytes() {
        assert_eq!(std::mem::size_of::<InputEvent>(), 12);
    }

    #[test]
    fn test_ring_layout() {
        // Indices + padding, then 256 twelve-byte slots.
        assert_eq!(std::mem::size_of::<InputRing>(), 16 + 256 * 12);
        assert_eq!(std::mem::offset_of!(InputRing, events), 16);
    }

    #[test]
    fn test_kind_conversion() {
        assert_eq!(InputEventKind::try_from(1).unwrap(), InputEventKind::MouseRelative);
        assert_eq!(InputEventKind::try_from(2).unwrap(), InputEventKind::MouseAbsolute);
        assert_eq!(InputEventKind::try_from(3).unwrap(), InputEventKind::MouseButton);
        assert_eq!(InputEventKind::try_from(4).unwrap(), InputEventKind::Key);
        assert!(InputEventKind::try_from(0).is_err());
        assert!(InputEventKind::try_from(5).is_err());
    }

    #[test]
    fn test_button_conversion() {
        assert_eq!(MouseButton::try_from(0).unwrap(), MouseButton::Left);
        assert_eq!(MouseButton::try_from(4).unwrap(), MouseButton::Extra);
        assert!(MouseButton::try_from(5).is_err());
    }

    #[test]
    fn test_push_and_drain_order() {
        let mut ring = InputRing::new();
        assert!(ring.push(InputEvent::mouse_relative(3, -2)));
        assert!(ring.push(InputEvent::mouse_button(MouseButton::Left, true)));
        assert!(ring.push(InputEvent::key(42, true)));
        assert_eq!(ring.pending(), 3);

        let w = ring.producer_index();
        let mut r = ring.consumer_index();
        let mut drained = Vec::new();
        while r != w {
            drained.push(ring.event_at(r));
            r = r.wrapping_add(1);
        }
        ring.commit_read(r);

        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].event_kind().unwrap(), InputEventKind::MouseRelative);
        assert_eq!((drained[0].x, drained[0].y), (3, -2));
        assert_eq!(drained[2].x, 42);
        assert_eq!(ring.pending(), 0);
    }

    #[test]
    fn test_push_refuses_overwrite() {
        let mut ring = InputRing::new();
        for i in 0..InputRing::CAPACITY {
            assert!(ring.push(InputEvent::key(i, true)));
        }
        // Full: one more push must not clobber slot 0.
        assert!(!ring.push(InputEvent::key(999, true)));
        assert_eq!(ring.event_at(0).x, 0);
        assert_eq!(ring.pending(), InputRing::CAPACITY);
    }

    #[test]
    fn test_indices_wrap_modulo_capacity() {
        let mut ring = InputRing::new();
        // Simulate long-lived unbounded counters near the u32 wrap.
        ring.write_idx.store(u32::MAX - 1, Ordering::Relaxed);
        ring.read_idx.store(u32::MAX - 1, Ordering::Relaxed);
        assert!(ring.push(InputEvent::key(7, true)));
        assert!(ring.push(InputEvent::key(8, false)));
        assert_eq!(ring.pending(), 2);
        let r = ring.consumer_index();
        assert_eq!(ring.event_at(r).x, 7);
        assert_eq!(ring.event_at(r.wrapping_add(1)).x, 8);
    }
}
