// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Anonymous shared-memory regions.
//!
//! Each channel owns one region backed by a `memfd_create(2)` descriptor.
//! The mapping is read-write on the emulator side; the descriptor is what
//! travels to the renderer over the rendezvous socket.

use std::ffi::CString;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use memmap2::MmapMut;
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use nix::unistd::ftruncate;

use crate::error::{Error, Result};

/// A mapped anonymous shared-memory region.
///
/// Dropping the region unmaps it and closes the descriptor. The renderer's
/// own mapping (via the passed fd) survives independently.
pub struct ShmRegion {
    fd: OwnedFd,
    map: MmapMut,
    len: usize,
}

impl ShmRegion {
    /// Allocates a zero-filled region of `len` bytes with an advisory name.
    pub fn alloc(name: &str, len: usize) -> Result<Self> {
        let cname =
            CString::new(name).map_err(|_| Error::RegionName(name.to_string()))?;
        let fd = memfd_create(&cname, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(Error::MemfdCreate)?;
        ftruncate(&fd, len as i64).map_err(|source| Error::RegionSize { len, source })?;
        let map = unsafe { MmapMut::map_mut(&fd.as_fd())? };
        Ok(ShmRegion { fd, map, len })
    }

    /// Region size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The descriptor to hand to the renderer.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl std::fmt::Debug for ShmRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmRegion").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_zero_filled() {
        let region = ShmRegion::alloc("juke-test", 4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(region.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_writes_are_readable_back() {
        let mut region = ShmRegion::alloc("juke-test", 128).unwrap();
        region.bytes_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&region.bytes()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_interior_nul_name_rejected() {
        assert!(matches!(
            ShmRegion::alloc("juke\0test", 64),
            Err(Error::RegionName(_))
        ));
    }
}
