//! File system error taxonomy (spec.md §7).

use thiserror::Error;

use crate::bd::BdError;
use crate::errors::{AsErrorKind, ErrorKind};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    Exists,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    Invalid,
    #[error("no space left on device")]
    NoSpace,
    #[error("underlying device unavailable")]
    Unavailable,
    #[error("bad size or file too large")]
    Size,
    #[error("underlying device i/o error")]
    Io,
    /// The volume's superblock doesn't match what `init` expects (bad
    /// magic, geometry that doesn't fit the device). Returned rather than
    /// panicking, since mounting a bad volume is a recoverable, reportable
    /// condition in a hosted library, not a kernel boot failure
    /// (SPEC_FULL.md §4.3).
    #[error("corrupt or incompatible file system")]
    Corrupt,
}

impl From<BdError> for FsError {
    fn from(e: BdError) -> Self {
        match e {
            BdError::Unavailable => FsError::Unavailable,
            BdError::Size => FsError::Size,
            BdError::OperationFailed => FsError::Invalid,
            BdError::Io(_) => FsError::Io,
        }
    }
}

impl AsErrorKind for FsError {
    fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotFound => ErrorKind::NotFound,
            FsError::Exists => ErrorKind::Exists,
            FsError::NotDir => ErrorKind::NotDir,
            FsError::IsDir => ErrorKind::IsDir,
            FsError::NotEmpty => ErrorKind::NotEmpty,
            FsError::Invalid => ErrorKind::Invalid,
            FsError::NoSpace => ErrorKind::NoSpace,
            FsError::Unavailable => ErrorKind::Unavailable,
            FsError::Size => ErrorKind::Size,
            FsError::Io => ErrorKind::Io,
            FsError::Corrupt => ErrorKind::Invalid,
        }
    }
}
