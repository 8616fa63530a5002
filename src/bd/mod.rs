//! Block device abstraction that RAID volumes are built out of and that a
//! file system is mounted on top of (spec.md §2 "Components, leaves first").
//!
//! Every concrete disk, and every RAID volume built by stacking them, speaks
//! the same [`BlockDevice`] trait, so a `raid::Stripe4` can itself be used as
//! a leaf of an outer `raid::Mirror`.

pub mod file;
pub mod mem;

use crate::errors::{AsErrorKind, ErrorKind};
use thiserror::Error;

/// Fixed block size for every device in this crate (spec.md §3).
pub const BLOCK_SIZE: usize = 1024;

/// Failures a block device (leaf or composite) can report.
#[derive(Debug, Error)]
pub enum BdError {
    /// A child (or the device itself) is gone; the caller may retry against
    /// a degraded volume, or the volume may now be terminally failed.
    #[error("device unavailable")]
    Unavailable,
    /// A `read`/`write`/`replace` argument didn't match the device's
    /// geometry (wrong block count for a replacement disk, `first + count`
    /// past the end of the device, ...).
    #[error("size mismatch or out-of-range request")]
    Size,
    /// An operation was requested for which no consistent answer is
    /// possible anymore (two distinct RAID-4 disk failures, etc).
    #[error("operation cannot be completed")]
    OperationFailed,
    /// The underlying host I/O failed (only produced by leaf devices that
    /// are backed by a real file descriptor).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AsErrorKind for BdError {
    fn kind(&self) -> ErrorKind {
        match self {
            BdError::Unavailable => ErrorKind::Unavailable,
            BdError::Size => ErrorKind::Size,
            BdError::OperationFailed => ErrorKind::Invalid,
            BdError::Io(_) => ErrorKind::Io,
        }
    }
}

/// A block-addressable device: `num_blocks` fixed-size [`BLOCK_SIZE`]
/// blocks, read and written `count` blocks at a time starting at `first`.
///
/// Implementors are not required to be thread-safe; this crate's device
/// stacks are driven from a single logical thread at a time.
pub trait BlockDevice {
    /// Total number of `BLOCK_SIZE` blocks this device exposes.
    fn num_blocks(&self) -> u32;

    /// Read `count` blocks starting at `first` into `buf`.
    ///
    /// `buf.len()` must equal `count as usize * BLOCK_SIZE`.
    fn read(&mut self, first: u32, count: u32, buf: &mut [u8]) -> Result<(), BdError>;

    /// Write `count` blocks starting at `first` from `buf`.
    ///
    /// `buf.len()` must equal `count as usize * BLOCK_SIZE`.
    fn write(&mut self, first: u32, count: u32, buf: &[u8]) -> Result<(), BdError>;

    /// Release any underlying resources. Idempotent: calling it more than
    /// once, or on an already-failed device, must not panic.
    fn close(&mut self);
}

pub(crate) fn check_bounds(first: u32, count: u32, nblks: u32, buf_len: usize) -> Result<(), BdError> {
    if buf_len != count as usize * BLOCK_SIZE {
        return Err(BdError::Size);
    }
    if count == 0 || first.checked_add(count).map(|end| end > nblks).unwrap_or(true) {
        return Err(BdError::Size);
    }
    Ok(())
}
