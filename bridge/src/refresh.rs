// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Refresh-rate probe.
//!
//! Picks the poll interval for the display refresh callback. Display
//! frameworks commonly default to ~30 ms (~33 fps), which is visibly poor
//! on modern panels; probing the active mode lets the bridge match the
//! physical refresh rate without overshooting it.
//!
//! On Linux the probe walks `/dev/dri/card*` and derives the rate from the
//! active CRTC mode timings; on macOS it asks CoreVideo for the main
//! display's nominal refresh period. Anything implausible falls back to
//! 8 ms (~120 Hz).

use std::time::Duration;

use log::info;

/// Fallback poll interval when probing fails or yields nonsense.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 8;

/// Probed intervals must be strictly below this to be believed.
pub const MAX_POLL_INTERVAL_MS: u64 = 100;

/// Chooses the refresh poll interval to register with the host's refresh
/// scheduler.
pub fn choose_poll_interval() -> Duration {
    let probed = probe_poll_interval_ms();
    let ms = clamp_interval_ms(probed);
    match probed {
        Some(_) => info!("juke-display: refresh interval {} ms (probed)", ms),
        None => info!("juke-display: refresh interval {} ms (default)", ms),
    }
    Duration::from_millis(ms)
}

/// Accepts a probed interval in `(0, 100)` ms, else the 8 ms default.
fn clamp_interval_ms(probed: Option<u64>) -> u64 {
    match probed {
        Some(ms) if ms > 0 && ms < MAX_POLL_INTERVAL_MS => ms,
        _ => DEFAULT_POLL_INTERVAL_MS,
    }
}

#[cfg(target_os = "linux")]
fn probe_poll_interval_ms() -> Option<u64> {
    drm::probe()
}

#[cfg(target_os = "macos")]
fn probe_poll_interval_ms() -> Option<u64> {
    corevideo::probe()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn probe_poll_interval_ms() -> Option<u64> {
    None
}

/// Mode probing through the DRM CRTC ioctls.
#[cfg(target_os = "linux")]
mod drm {
    // The structs mirror the kernel UAPI layout in full; only the timing
    // fields are read back.
    #![allow(dead_code)]

    use std::fs::File;
    use std::os::fd::AsRawFd;

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    struct DrmModeCardRes {
        fb_id_ptr: u64,
        crtc_id_ptr: u64,
        connector_id_ptr: u64,
        encoder_id_ptr: u64,
        count_fbs: u32,
        count_crtcs: u32,
        count_connectors: u32,
        count_encoders: u32,
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    struct DrmModeInfo {
        clock: u32,
        hdisplay: u16,
        hsync_start: u16,
        hsync_end: u16,
        htotal: u16,
        hskew: u16,
        vdisplay: u16,
        vsync_start: u16,
        vsync_end: u16,
        vtotal: u16,
        vscan: u16,
        vrefresh: u32,
        flags: u32,
        mode_type: u32,
        name: [u8; 32],
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    struct DrmModeCrtc {
        set_connectors_ptr: u64,
        count_connectors: u32,
        crtc_id: u32,
        fb_id: u32,
        x: u32,
        y: u32,
        gamma_size: u32,
        mode_valid: u32,
        mode: DrmModeInfo,
    }

    nix::ioctl_readwrite!(drm_mode_get_resources, b'd', 0xa0, DrmModeCardRes);
    nix::ioctl_readwrite!(drm_mode_get_crtc, b'd', 0xa1, DrmModeCrtc);

    /// Smallest positive interval across the CRTCs of the first card that
    /// yields one (highest refresh wins).
    pub fn probe() -> Option<u64> {
        for index in 0..8 {
            let Ok(card) = File::open(format!("/dev/dri/card{}", index)) else {
                continue;
            };
            if let Some(interval) = probe_card(&card) {
                return Some(interval);
            }
        }
        None
    }

    fn probe_card(card: &File) -> Option<u64> {
        let fd = card.as_raw_fd();

        // First call counts the CRTCs, the second fills the id array.
        let mut res = DrmModeCardRes::default();
        unsafe { drm_mode_get_resources(fd, &mut res) }.ok()?;
        if res.count_crtcs == 0 {
            return None;
        }
        let mut crtc_ids = vec![0u32; res.count_crtcs as usize];
        let mut res = DrmModeCardRes {
            crtc_id_ptr: crtc_ids.as_mut_ptr() as u64,
            count_crtcs: res.count_crtcs,
            ..Default::default()
        };
        unsafe { drm_mode_get_resources(fd, &mut res) }.ok()?;
        let filled = (res.count_crtcs as usize).min(crtc_ids.len());

        let mut best: Option<u64> = None;
        for &crtc_id in &crtc_ids[..filled] {
            let mut crtc = DrmModeCrtc {
                crtc_id,
                ..Default::default()
            };
            if unsafe { drm_mode_get_crtc(fd, &mut crtc) }.is_err() {
                continue;
            }
            if crtc.mode_valid == 0 {
                continue;
            }
            let Some(interval) = mode_interval_ms(&crtc.mode) else {
                continue;
            };
            best = Some(best.map_or(interval, |b| b.min(interval)));
        }
        best
    }

    /// `Hz = clock·1000 / (htotal · vtotal)`; `clock` is in kHz.
    fn mode_interval_ms(mode: &DrmModeInfo) -> Option<u64> {
        let denominator = u64::from(mode.htotal) * u64::from(mode.vtotal);
        if denominator == 0 {
            return None;
        }
        let hz = u64::from(mode.clock) * 1000 / denominator;
        if hz == 0 {
            return None;
        }
        let interval = 1000 / hz;
        (interval > 0).then_some(interval)
    }
}

/// Nominal refresh period of the main display via CoreVideo.
#[cfg(target_os = "macos")]
mod corevideo {
    use std::ptr::NonNull;

    use objc2_core_foundation::CFRetained;
    use objc2_core_video::{kCVReturnSuccess, CVDisplayLink};

    #[expect(
        deprecated,
        reason = "CVDisplayLink still reports the nominal refresh period"
    )]
    pub fn probe() -> Option<u64> {
        let mut link_ptr: *mut CVDisplayLink = std::ptr::null_mut();
        // SAFETY: link_ptr is a valid out-pointer.
        let ret = unsafe {
            CVDisplayLink::create_with_active_cg_displays(NonNull::new_unchecked(&mut link_ptr))
        };
        if ret != kCVReturnSuccess {
            return None;
        }
        // SAFETY: the create call follows the Create Rule, returning a +1
        // retained reference.
        let link = unsafe { CFRetained::from_raw(NonNull::new(link_ptr)?) };
        let period = link.nominal_output_video_refresh_period();
        if period.timeValue <= 0 || period.timeScale <= 0 {
            return None;
        }
        let ms = period.timeValue.saturating_mul(1000) / i64::from(period.timeScale);
        u64::try_from(ms).ok().filter(|&ms| ms > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probed_interval_in_range_is_kept() {
        assert_eq!(clamp_interval_ms(Some(16)), 16);
        assert_eq!(clamp_interval_ms(Some(1)), 1);
        assert_eq!(clamp_interval_ms(Some(99)), 99);
    }

    #[test]
    fn test_out_of_range_falls_back() {
        assert_eq!(clamp_interval_ms(None), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(clamp_interval_ms(Some(0)), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(clamp_interval_ms(Some(100)), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(clamp_interval_ms(Some(1000)), DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_choose_poll_interval_is_positive_and_bounded() {
        let interval = choose_poll_interval();
        assert!(interval > Duration::ZERO);
        assert!(interval < Duration::from_millis(MAX_POLL_INTERVAL_MS));
    }
}
