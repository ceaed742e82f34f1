// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared-memory protocol definitions between the emulator bridge and the
//! Juke renderer.
//!
//! These structures are mapped directly into the shared regions and must be
//! kept in sync with the renderer. Field order, widths and offsets are ABI;
//! all multi-byte values are little-endian (native on every supported
//! target).
//!
//! # Regions
//!
//! ```text
//! Display region                        Audio region
//! ┌─────────────────────────┐           ┌─────────────────────────┐
//! │ DisplayHeader (80 B)    │           │ AudioHeader (64 B)      │
//! ├─────────────────────────┤           ├─────────────────────────┤
//! │ Cursor slot 64×64 RGBA  │           │ PCM ring                │
//! ├─────────────────────────┤           │ (8192 frames)           │
//! │ InputRing (256 events)  │           └─────────────────────────┘
//! ├─────────────────────────┤
//! │ Pixels (stride × height)│
//! └─────────────────────────┘
//! ```
//!
//! # Synchronization
//!
//! Every field mutated after region init is an independent single-word
//! atomic. Consumers must acquire-load the designated anchor
//! (`frame_counter`, `cursor_version`, or a ring index) before reading the
//! fields it covers; producers release-publish through the same anchor.

pub mod audio;
pub mod display;
pub mod input;

pub use audio::{AudioHeader, AudioLayout, SampleFormat, AUDIO_MAGIC, AUDIO_RING_FRAMES, AUDIO_VERSION};
pub use display::{DisplayHeader, DisplayLayout, CURSOR_SLOT_BYTES, CURSOR_SLOT_DIM, DISPLAY_MAGIC, DISPLAY_VERSION};
pub use input::{InputEvent, InputEventKind, InputRing, MouseButton};
