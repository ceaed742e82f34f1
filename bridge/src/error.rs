// Copyright 2024 The Juke Bridge Authors
// SPDX-License-Identifier: Apache-2.0

//! Bridge error types.
//!
//! Only setup paths are fallible; the per-frame and per-buffer operations
//! swallow failures and degrade as the channel contracts require.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid shared region name: {0}")]
    RegionName(String),
    #[error("memfd allocation failed: {0}")]
    MemfdCreate(#[source] nix::Error),
    #[error("failed to size shared region to {len} bytes: {source}")]
    RegionSize { len: usize, source: nix::Error },
    #[error("failed to map shared region: {0}")]
    Map(#[from] std::io::Error),
}
