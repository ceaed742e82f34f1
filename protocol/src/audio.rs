// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Audio region header and ring math.
//!
//! The audio region is allocated once at voice init and never grown. A
//! single-producer/single-consumer PCM ring follows the header; the
//! emulator owns `write_idx`, the renderer owns `read_idx`, `enabled` and
//! nothing else. Full and empty are distinguished by leaving one slot
//! unused.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Magic number for audio header validation: "JAUD" little-endian.
pub const AUDIO_MAGIC: u32 = 0x4455414A;

/// Current audio protocol version (v2 adds mute and volume fields).
pub const AUDIO_VERSION: u32 = 2;

/// Ring capacity in frames. Must be a power of two.
pub const AUDIO_RING_FRAMES: u32 = 8192;

/// PCM sample format codes shared with the renderer.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 16-bit signed PCM, little-endian
    S16Le = 1,
    /// 32-bit float, little-endian
    F32Le = 2,
}

impl TryFrom<u32> for SampleFormat {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SampleFormat::S16Le),
            2 => Ok(SampleFormat::F32Le),
            _ => Err("Invalid sample format value"),
        }
    }
}

impl SampleFormat {
    /// Bytes per sample for this format.
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }
}

/// Audio region header (64 bytes, at the start of shared memory).
///
/// `magic`, `version`, `sample_rate`, `channels`, `format` and
/// `ring_frames` are written at init and never mutated. The remaining
/// fields are independent single-word atomics: the emulator owns
/// `write_idx`, `muted` and the volumes; the renderer owns `read_idx` and
/// `enabled`.
#[repr(C)]
#[derive(Debug)]
pub struct AudioHeader {
    /// Magic number for validation (`AUDIO_MAGIC`)
    pub magic: u32,
    /// Protocol version (`AUDIO_VERSION`)
    pub version: u32,
    /// Sample rate in Hz (e.g. 48000)
    pub sample_rate: u32,
    /// Channel count, 1 or 2
    pub channels: u32,
    /// Sample format (see [`SampleFormat`])
    pub format: u32,
    /// Ring capacity in frames, power of two
    pub ring_frames: u32,
    /// Producer frame index (emulator)
    pub write_idx: AtomicU32,
    /// Consumer frame index (renderer)
    pub read_idx: AtomicU32,
    /// 1 = playing, 0 = paused; written by the renderer only
    pub enabled: AtomicU32,
    /// 1 = muted by the guest mixer
    pub muted: AtomicU32,
    /// Left channel volume, 0..=255
    pub volume_left: AtomicU32,
    /// Right channel volume, 0..=255
    pub volume_right: AtomicU32,
    _padding: [u32; 4],
}

impl AudioHeader {
    /// Creates a header for a fresh voice. Playback starts disabled (the
    /// renderer enables it when ready) at full, unmuted volume.
    pub fn new(sample_rate: u32, channels: u32, format: SampleFormat) -> Self {
        AudioHeader {
            magic: AUDIO_MAGIC,
            version: AUDIO_VERSION,
            sample_rate,
            channels,
            format: format as u32,
            ring_frames: AUDIO_RING_FRAMES,
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            enabled: AtomicU32::new(0),
            muted: AtomicU32::new(0),
            volume_left: AtomicU32::new(255),
            volume_right: AtomicU32::new(255),
            _padding: [0; 4],
        }
    }

    /// Validates the header magic number and version.
    pub fn validate(&self) -> bool {
        self.magic == AUDIO_MAGIC && self.version == AUDIO_VERSION
    }

    /// Whether the renderer has enabled playback.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) != 0
    }

    /// Renderer-side enable/pause control.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(u32::from(enabled), Ordering::Release);
    }

    /// Frames the producer may still write given its own index. Leaves one
    /// slot unused so a full ring is distinguishable from an empty one.
    pub fn free_frames(&self, write_idx: u32) -> u32 {
        let read_idx = self.read_idx.load(Ordering::Acquire);
        let used = write_idx.wrapping_sub(read_idx) & (self.ring_frames - 1);
        self.ring_frames - used - 1
    }

    /// Frames available to the consumer given its own index.
    pub fn used_frames(&self, read_idx: u32) -> u32 {
        let write_idx = self.write_idx.load(Ordering::Acquire);
        write_idx.wrapping_sub(read_idx) & (self.ring_frames - 1)
    }

    /// Acquire-loads the producer index (renderer side).
    pub fn write_index(&self) -> u32 {
        self.write_idx.load(Ordering::Acquire)
    }

    /// Acquire-loads the consumer index (emulator side).
    pub fn read_index(&self) -> u32 {
        self.read_idx.load(Ordering::Acquire)
    }

    /// Release-publishes the producer index; sample bytes below it must
    /// already be written.
    pub fn publish_write_index(&self, idx: u32) {
        self.write_idx.store(idx, Ordering::Release);
    }

    /// Release-publishes the consumer index (renderer side).
    pub fn advance_read_index(&self, idx: u32) {
        self.read_idx.store(idx, Ordering::Release);
    }

    /// Mirrors the guest mixer state for the renderer to honor.
    pub fn set_volume(&self, muted: bool, left: u32, right: u32) {
        self.muted.store(u32::from(muted), Ordering::Release);
        self.volume_left.store(left, Ordering::Release);
        self.volume_right.store(right, Ordering::Release);
    }

    /// Gets the guest mixer state as `(muted, left, right)`.
    pub fn volume(&self) -> (bool, u32, u32) {
        (
            self.muted.load(Ordering::Acquire) != 0,
            self.volume_left.load(Ordering::Acquire),
            self.volume_right.load(Ordering::Acquire),
        )
    }
}

/// Audio region layout calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLayout {
    /// Bytes per PCM frame (`channels × bytes_per_sample`)
    pub bytes_per_frame: u32,
    /// Ring size in bytes
    pub ring_bytes: usize,
    /// Total region size in bytes
    pub total_size: usize,
}

impl AudioLayout {
    /// Size of the header in bytes.
    pub const HEADER_SIZE: usize = 64;

    /// Creates the layout for the given channel count and format.
    pub fn new(channels: u32, format: SampleFormat) -> Self {
        let bytes_per_frame = channels * format.bytes_per_sample();
        let ring_bytes = AUDIO_RING_FRAMES as usize * bytes_per_frame as usize;
        AudioLayout {
            bytes_per_frame,
            ring_bytes,
            total_size: Self::HEADER_SIZE + ring_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_is_abi() {
        assert_eq!(std::mem::size_of::<AudioHeader>(), AudioLayout::HEADER_SIZE);
    }

    #[test]
    fn test_ring_frames_power_of_two() {
        assert!(AUDIO_RING_FRAMES.is_power_of_two());
    }

    #[test]
    fn test_sample_format_conversion() {
        assert_eq!(SampleFormat::try_from(1).unwrap(), SampleFormat::S16Le);
        assert_eq!(SampleFormat::try_from(2).unwrap(), SampleFormat::F32Le);
        assert!(SampleFormat::try_from(0).is_err());
        assert!(SampleFormat::try_from(3).is_err());
    }

    #[test]
    fn test_layout_sizes() {
        let s16 = AudioLayout::new(2, SampleFormat::S16Le);
        assert_eq!(s16.bytes_per_frame, 4);
        assert_eq!(s16.total_size, 64 + 8192 * 4);

        let f32_mono = AudioLayout::new(1, SampleFormat::F32Le);
        assert_eq!(f32_mono.bytes_per_frame, 4);

        let f32_stereo = AudioLayout::new(2, SampleFormat::F32Le);
        assert_eq!(f32_stereo.bytes_per_frame, 8);
        assert_eq!(f32_stereo.total_size, 64 + 8192 * 8);
    }

    #[test]
    fn test_header_init_state() {
        let header = AudioHeader::new(48000, 2, SampleFormat::S16Le);
        assert!(header.validate());
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.channels, 2);
        assert_eq!(header.format, SampleFormat::S16Le as u32);
        assert_eq!(header.ring_frames, AUDIO_RING_FRAMES);
        assert!(!header.is_enabled());
        assert_eq!(header.volume(), (false, 255, 255));
    }

    #[test]
    fn test_free_frames_one_slot_unused() {
        let header = AudioHeader::new(48000, 2, SampleFormat::S16Le);
        // Empty ring leaves capacity − 1 writable.
        assert_eq!(header.free_frames(0), AUDIO_RING_FRAMES - 1);

        header.advance_read_index(0);
        assert_eq!(header.free_frames(AUDIO_RING_FRAMES - 1), 0);

        // Consumer catches up; full capacity minus one reopens.
        header.advance_read_index(AUDIO_RING_FRAMES - 1);
        assert_eq!(header.free_frames(AUDIO_RING_FRAMES - 1), AUDIO_RING_FRAMES - 1);
    }

    #[test]
    fn test_used_frames_wraps() {
        let header = AudioHeader::new(48000, 2, SampleFormat::S16Le);
        header.publish_write_index(10_096);
        assert_eq!(header.used_frames(4096), (10_096 - 4096) & (AUDIO_RING_FRAMES - 1));
        // Unbounded counters across the u32 wrap.
        header.publish_write_index(5);
        assert_eq!(header.used_frames(u32::MAX - 2), 8);
    }

    #[test]
    fn test_volume_round_trip() {
        let header = AudioHeader::new(48000, 2, SampleFormat::S16Le);
        header.set_volume(true, 100, 200);
        assert_eq!(header.volume(), (true, 100, 200));
        header.set_volume(false, 255, 255);
        assert_eq!(header.volume(), (false, 255, 255));
    }
}
