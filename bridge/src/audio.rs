// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Audio channel.
//!
//! Owns the fixed-size PCM region and implements the audio-framework
//! callback surface: voice init, the hot-path write, enable, guest volume
//! mirroring and fini. The region is allocated once on first voice init
//! and never grown.
//!
//! Backpressure never blocks: while the renderer has playback disabled, or
//! the ring is full, the host's rate controller decides how many bytes the
//! mixer should believe were consumed, so upstream drains at real-time
//! pace.

use std::ptr;

use log::{error, info};

use juke_protocol::{AudioHeader, AudioLayout, SampleFormat};

use crate::error::Result;
use crate::shmem::ShmRegion;
use crate::transport::Rendezvous;

/// Advisory name of the audio region's memfd.
const AUDIO_SHM_NAME: &str = "juke-audio";

/// Host rate-controller seam (the mixer's pacing machinery).
pub trait RateControl {
    /// Restart the pacing clock, e.g. when the voice is re-enabled.
    fn restart(&mut self);
    /// Bytes the mixer would have consumed in the elapsed real time, at
    /// most `len`. Used in place of ring writes while paused or full.
    fn consumed_bytes(&mut self, len: usize) -> usize;
}

/// PCM voice settings from the host audio framework.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PcmSettings {
    pub sample_rate: u32,
    /// 1 or 2
    pub channels: u32,
    pub format: SampleFormat,
}

impl PcmSettings {
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels * self.format.bytes_per_sample()
    }
}

impl Default for PcmSettings {
    fn default() -> Self {
        PcmSettings {
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::S16Le,
        }
    }
}

struct MappedAudio {
    shm: ShmRegion,
    layout: AudioLayout,
}

impl MappedAudio {
    fn header(&self) -> &AudioHeader {
        unsafe { &*(self.shm.as_ptr() as *const AudioHeader) }
    }

    fn samples_mut(&mut self) -> &mut [u8] {
        let end = AudioLayout::HEADER_SIZE + self.layout.ring_bytes;
        &mut self.shm.bytes_mut()[AudioLayout::HEADER_SIZE..end]
    }
}

/// Emulator side of the audio shared-memory channel.
pub struct AudioChannel<R: RateControl> {
    transport: Rendezvous,
    region: Option<MappedAudio>,
    rate: R,
    /// Producer frame index; the header mirror is release-published after
    /// each ring write. Only this side ever writes it.
    write_idx: u32,
    warned_alloc: bool,
}

impl<R: RateControl> AudioChannel<R> {
    /// Creates the channel. `socket_path` is the renderer's rendezvous
    /// socket; `rate` paces upstream consumption while the ring is
    /// unavailable.
    pub fn new(socket_path: impl Into<std::path::PathBuf>, rate: R) -> Self {
        AudioChannel {
            transport: Rendezvous::new("juke-audio", socket_path),
            region: None,
            rate,
            write_idx: 0,
            warned_alloc: false,
        }
    }

    /// The mapped header, once a voice has been initialized.
    pub fn header(&self) -> Option<&AudioHeader> {
        self.region.as_ref().map(MappedAudio::header)
    }

    /// The PCM ring bytes, once a voice has been initialized.
    pub fn samples(&self) -> Option<&[u8]> {
        self.region.as_ref().map(|m| {
            &m.shm.bytes()[AudioLayout::HEADER_SIZE..AudioLayout::HEADER_SIZE + m.layout.ring_bytes]
        })
    }

    /// Voice init. The first call allocates and formats the region; later
    /// calls only restart the rate controller and re-kick the handshake.
    pub fn init_out(&mut self, settings: &PcmSettings) -> Result<()> {
        self.rate.restart();

        if self.region.is_none() {
            let layout = AudioLayout::new(settings.channels, settings.format);
            let mut shm = match ShmRegion::alloc(AUDIO_SHM_NAME, layout.total_size) {
                Ok(shm) => shm,
                Err(e) => {
                    if !self.warned_alloc {
                        error!("juke-audio: failed to allocate shared region: {}", e);
                        self.warned_alloc = true;
                    }
                    return Err(e);
                }
            };
            unsafe {
                ptr::write(
                    shm.as_mut_ptr() as *mut AudioHeader,
                    AudioHeader::new(settings.sample_rate, settings.channels, settings.format),
                );
            }
            info!(
                "juke-audio: initialized {} Hz {} ch format={} ring={} frames",
                settings.sample_rate,
                settings.channels,
                settings.format as u32,
                juke_protocol::AUDIO_RING_FRAMES,
            );
            self.region = Some(MappedAudio { shm, layout });
            self.write_idx = 0;
            self.warned_alloc = false;
        }

        self.transport.poll_connect();
        if let Some(mapped) = &self.region {
            self.transport.send_fd(mapped.shm.fd());
        }
        Ok(())
    }

    /// The hot path: copy PCM frames into the ring and report how many
    /// bytes were taken.
    ///
    /// Returns exactly `frames_written × bytes_per_frame` when frames fit;
    /// otherwise the rate controller's real-time estimate, advancing
    /// nothing.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if !self.transport.is_connected() {
            self.transport.poll_connect();
        }
        if let Some(mapped) = &self.region {
            self.transport.send_fd(mapped.shm.fd());
        }

        let Some(mapped) = self.region.as_mut() else {
            return self.rate.consumed_bytes(buf.len());
        };

        if !mapped.header().is_enabled() {
            // Renderer paused: drain upstream at real-time pace, touch
            // nothing in the ring.
            return self.rate.consumed_bytes(buf.len());
        }

        let bytes_per_frame = mapped.layout.bytes_per_frame as usize;
        let free = mapped.header().free_frames(self.write_idx) as usize;
        let frames = (buf.len() / bytes_per_frame).min(free);
        if frames == 0 {
            return self.rate.consumed_bytes(buf.len());
        }

        let ring_frames = mapped.header().ring_frames;
        let write_offset = ((self.write_idx & (ring_frames - 1)) as usize) * bytes_per_frame;
        let nbytes = frames * bytes_per_frame;

        let samples = mapped.samples_mut();
        let first = (samples.len() - write_offset).min(nbytes);
        samples[write_offset..write_offset + first].copy_from_slice(&buf[..first]);
        if first < nbytes {
            samples[..nbytes - first].copy_from_slice(&buf[first..nbytes]);
        }

        let new_idx = self.write_idx.wrapping_add(frames as u32);
        mapped.header().publish_write_index(new_idx);
        self.write_idx = new_idx;

        nbytes
    }

    /// Voice enable/disable from the host framework. The header's
    /// `enabled` field belongs to the renderer, so only the pacing clock
    /// reacts here.
    pub fn enable_out(&mut self, enable: bool) {
        if enable {
            self.rate.restart();
        }
    }

    /// Mirrors a guest mixer change into the header. `volume` holds one
    /// value per channel in 0..=255; mono voices reuse the left value for
    /// the right field.
    pub fn volume_out(&mut self, muted: bool, volume: &[u8]) {
        let Some(mapped) = &self.region else {
            return;
        };
        let header = mapped.header();
        let left = volume.first().copied().unwrap_or(255);
        let right = if header.channels > 1 {
            volume.get(1).copied().unwrap_or(left)
        } else {
            left
        };
        header.set_volume(muted, u32::from(left), u32::from(right));
    }

    /// Releases the socket and the region.
    pub fn fini(&mut self) {
        self.transport.close();
        self.region = None;
    }
}

impl<R: RateControl> Drop for AudioChannel<R> {
    fn drop(&mut self) {
        self.fini();
    }
}
