// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous transport.
//!
//! Each channel holds one UNIX stream client whose sole job is to carry the
//! shared-region descriptor to the renderer as `SCM_RIGHTS` ancillary data,
//! accompanied by a single dummy payload byte (kernels refuse zero-length
//! control messages). After that the socket stays idle.
//!
//! The renderer is the server and may not be up yet; connecting is retried
//! from the refresh/write paths and fails silently until it succeeds.

use std::io::IoSlice;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use log::{info, warn};
use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};

/// One-shot fd rendezvous client.
pub struct Rendezvous {
    label: &'static str,
    path: PathBuf,
    stream: Option<UnixStream>,
    fd_sent: bool,
    warned_send: bool,
}

impl Rendezvous {
    /// Creates a client for the renderer socket at `path`. `label` prefixes
    /// log lines ("juke-display", "juke-audio").
    pub fn new(label: &'static str, path: impl Into<PathBuf>) -> Self {
        Rendezvous {
            label,
            path: path.into(),
            stream: None,
            fd_sent: false,
            warned_send: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the current region's fd has reached the peer.
    pub fn fd_sent(&self) -> bool {
        self.fd_sent
    }

    /// Attempts to connect if not already connected. Failure is silent; the
    /// renderer may simply not be listening yet.
    pub fn poll_connect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        match UnixStream::connect(&self.path) {
            Ok(stream) => {
                info!("{}: connected to {}", self.label, self.path.display());
                self.stream = Some(stream);
                self.fd_sent = false;
                self.warned_send = false;
                true
            }
            Err(_) => false,
        }
    }

    /// Sends the region descriptor once. A no-op when there is no peer or
    /// the fd has already been sent.
    ///
    /// On failure the stream is dropped and `fd_sent` cleared, so a
    /// reconnect to a new renderer resends the fd.
    pub fn send_fd(&mut self, fd: BorrowedFd<'_>) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if self.fd_sent {
            return true;
        }

        let payload = [0u8; 1];
        let iov = [IoSlice::new(&payload)];
        let fds = [fd.as_raw_fd()];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        match sendmsg::<()>(
            stream.as_raw_fd(),
            &iov,
            &cmsg,
            MsgFlags::MSG_NOSIGNAL,
            None,
        ) {
            Ok(_) => {
                info!("{}: sent region fd to renderer", self.label);
                self.fd_sent = true;
                true
            }
            Err(e) => {
                if !self.warned_send {
                    warn!("{}: failed to send region fd: {}", self.label, e);
                    self.warned_send = true;
                }
                self.stream = None;
                self.fd_sent = false;
                false
            }
        }
    }

    /// Marks the region as replaced so the next opportunity resends the fd.
    pub fn mark_region_replaced(&mut self) {
        self.fd_sent = false;
    }

    /// Drops the connection.
    pub fn close(&mut self) {
        self.stream = None;
        self.fd_sent = false;
    }
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("label", &self.label)
            .field("path", &self.path)
            .field("connected", &self.stream.is_some())
            .field("fd_sent", &self.fd_sent)
            .finish()
    }
}
