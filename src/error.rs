// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error kinds surfaced at the FusionSound API boundary.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// Every public operation either succeeds or returns one of these and
/// leaves all objects in their prior state (spec.md §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("busy")]
    Busy,

    #[error("locked")]
    Locked,

    #[error("temporarily unavailable")]
    TemporarilyUnavailable,

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("buffer empty")]
    BufferEmpty,

    #[error("end of file")]
    EndOfFile,

    #[error("timeout")]
    Timeout,

    #[error("suspended")]
    Suspended,

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::IoFailure(e.to_string())
    }
}
