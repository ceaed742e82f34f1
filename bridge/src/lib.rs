// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Guest-to-host shared-memory bridge for the Juke renderer.
//!
//! Two independent channels hand framebuffer, cursor, input and PCM audio
//! to an external renderer process with zero syscalls on the hot path:
//!
//! - The **display channel** owns a resizable region (header, cursor
//!   sprite slot, renderer-fed input ring, pixel buffer) and republishes
//!   the guest surface on every dirty update.
//! - The **audio channel** owns a fixed region (header plus an 8192-frame
//!   SPSC PCM ring) written from the mixer's output path.
//!
//! Each channel uses a UNIX stream socket only as a rendezvous: one dummy
//! byte carries the region's file descriptor as `SCM_RIGHTS` ancillary
//! data, then the socket sits idle. The renderer is the server; the
//! emulator retries connecting until it appears. All coordination after
//! the handshake is relaxed/acquire/release atomics in the mapped regions
//! (layouts in the `juke-protocol` crate).
//!
//! The host framework drives each channel from a single thread; nothing
//! here blocks, and no hot-path failure is fatal.

pub mod audio;
pub mod display;
pub mod error;
pub mod input;
pub mod refresh;
pub mod shmem;
pub mod transport;

pub use audio::{AudioChannel, PcmSettings, RateControl};
pub use display::{Console, CursorSprite, DisplayChannel, DisplayListener, SurfaceView};
pub use error::{Error, Result};
pub use input::{drain_ring, DrainStats, InputSink};
pub use refresh::{choose_poll_interval, DEFAULT_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS};
pub use shmem::ShmRegion;
pub use transport::Rendezvous;
