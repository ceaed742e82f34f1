// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Input ring drain.
//!
//! The renderer produces events into the in-region ring; the display
//! channel drains them on every refresh tick and dispatches to the host's
//! input sink. Both indices are unbounded u32 counters, so the pending
//! count is unsigned modular subtraction and slots are taken modulo the
//! ring capacity.

use juke_protocol::{InputEventKind, InputRing, MouseButton};

/// Host input-device seam receiving the drained events.
///
/// `sync` is called once after a batch so the host can flush coalesced
/// device state, mirroring how input frameworks batch queued events.
pub trait InputSink {
    /// Relative mouse motion in surface pixels.
    fn mouse_relative(&mut self, dx: i32, dy: i32);
    /// Absolute mouse position in `[0, width) × [0, height)`.
    fn mouse_absolute(&mut self, x: i32, y: i32, width: u32, height: u32);
    /// Mouse button press/release.
    fn mouse_button(&mut self, button: MouseButton, pressed: bool);
    /// Key press/release by scancode.
    fn key(&mut self, scancode: u32, pressed: bool);
    /// Flush a drained batch.
    fn sync(&mut self);
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Events translated and dispatched
    pub dispatched: usize,
    /// Malformed events skipped (unknown kind or button code)
    pub skipped: usize,
}

/// Drains every pending event and dispatches it in order.
///
/// `width`/`height` are the current surface dimensions, forwarded with
/// absolute positions so the sink can scale them. If anything was
/// consumed, the sink is flushed and the consumer index published.
pub fn drain_ring(
    ring: &InputRing,
    width: u32,
    height: u32,
    sink: &mut dyn InputSink,
) -> DrainStats {
    let producer = ring.producer_index();
    let mut idx = ring.consumer_index();
    if idx == producer {
        return DrainStats::default();
    }

    let mut stats = DrainStats::default();
    while idx != producer {
        let event = ring.event_at(idx);
        match event.event_kind() {
            Ok(InputEventKind::MouseRelative) => {
                sink.mouse_relative(event.x, event.y);
                stats.dispatched += 1;
            }
            Ok(InputEventKind::MouseAbsolute) => {
                sink.mouse_absolute(event.x, event.y, width, height);
                stats.dispatched += 1;
            }
            Ok(InputEventKind::MouseButton) => match MouseButton::try_from(event.button) {
                Ok(button) => {
                    sink.mouse_button(button, event.pressed != 0);
                    stats.dispatched += 1;
                }
                Err(_) => stats.skipped += 1,
            },
            Ok(InputEventKind::Key) => {
                sink.key(event.x as u32, event.pressed != 0);
                stats.dispatched += 1;
            }
            Err(_) => stats.skipped += 1,
        }
        idx = idx.wrapping_add(1);
    }

    sink.sync();
    ring.commit_read(idx);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use juke_protocol::InputEvent;

    #[derive(Debug, PartialEq, Eq)]
    enum Dispatched {
        Rel(i32, i32),
        Abs(i32, i32, u32, u32),
        Btn(MouseButton, bool),
        Key(u32, bool),
        Sync,
    }

    #[derive(Default)]
    struct RecordingSink(Vec<Dispatched>);

    impl InputSink for RecordingSink {
        fn mouse_relative(&mut self, dx: i32, dy: i32) {
            self.0.push(Dispatched::Rel(dx, dy));
        }
        fn mouse_absolute(&mut self, x: i32, y: i32, width: u32, height: u32) {
            self.0.push(Dispatched::Abs(x, y, width, height));
        }
        fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
            self.0.push(Dispatched::Btn(button, pressed));
        }
        fn key(&mut self, scancode: u32, pressed: bool) {
            self.0.push(Dispatched::Key(scancode, pressed));
        }
        fn sync(&mut self) {
            self.0.push(Dispatched::Sync);
        }
    }

    #[test]
    fn test_empty_ring_drains_cleanly() {
        let ring = InputRing::new();
        let mut sink = RecordingSink::default();
        assert_eq!(drain_ring(&ring, 800, 600, &mut sink), DrainStats::default());
        assert!(sink.0.is_empty());
        assert_eq!(ring.consumer_index(), 0);
    }

    #[test]
    fn test_drains_in_order_and_commits() {
        let mut ring = InputRing::new();
        assert!(ring.push(InputEvent::mouse_relative(3, -2)));
        assert!(ring.push(InputEvent::mouse_button(MouseButton::Right, true)));
        assert!(ring.push(InputEvent::key(42, true)));

        let mut sink = RecordingSink::default();
        let stats = drain_ring(&ring, 800, 600, &mut sink);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(
            sink.0,
            vec![
                Dispatched::Rel(3, -2),
                Dispatched::Btn(MouseButton::Right, true),
                Dispatched::Key(42, true),
                Dispatched::Sync,
            ]
        );
        assert_eq!(ring.consumer_index(), 3);
    }

    #[test]
    fn test_absolute_carries_surface_dims() {
        let mut ring = InputRing::new();
        assert!(ring.push(InputEvent::mouse_absolute(640, 359)));
        let mut sink = RecordingSink::default();
        drain_ring(&ring, 1280, 720, &mut sink);
        assert_eq!(sink.0[0], Dispatched::Abs(640, 359, 1280, 720));
    }

    #[test]
    fn test_malformed_events_skipped() {
        let mut ring = InputRing::new();
        assert!(ring.push(InputEvent {
            kind: 99,
            ..InputEvent::ZERO
        }));
        assert!(ring.push(InputEvent {
            kind: InputEventKind::MouseButton as u8,
            button: 200,
            pressed: 1,
            ..InputEvent::ZERO
        }));
        assert!(ring.push(InputEvent::key(7, false)));

        let mut sink = RecordingSink::default();
        let stats = drain_ring(&ring, 800, 600, &mut sink);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(sink.0, vec![Dispatched::Key(7, false), Dispatched::Sync]);
        // The malformed slots are still consumed.
        assert_eq!(ring.consumer_index(), 3);
    }
}
