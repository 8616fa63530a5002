//! In-memory leaf block device with fail-injection, used by RAID and file
//! system tests that need a concrete disk but shouldn't depend on the host
//! file system (grounded on the need for a leaf "external, interface only"
//! device described in SPEC_FULL.md §2).

use std::cell::RefCell;
use std::rc::Rc;

use super::{check_bounds, BdError, BlockDevice, BLOCK_SIZE};

struct Inner {
    blocks: Vec<u8>,
    nblks: u32,
    failed: bool,
    closed: bool,
}

/// A RAM-backed disk. Cloning shares the same backing storage and fail
/// flag, so a test can hold one [`MemBlockDevice`] handle, hand a clone to
/// a RAID volume, and later call [`MemBlockDevice::fail`] on its own handle
/// to simulate that disk going away mid-volume.
#[derive(Clone)]
pub struct MemBlockDevice {
    inner: Rc<RefCell<Inner>>,
}

impl MemBlockDevice {
    pub fn new(nblks: u32) -> Self {
        MemBlockDevice {
            inner: Rc::new(RefCell::new(Inner {
                blocks: vec![0u8; nblks as usize * BLOCK_SIZE],
                nblks,
                failed: false,
                closed: false,
            })),
        }
    }

    /// Mark this disk unavailable: every subsequent `read`/`write` returns
    /// [`BdError::Unavailable`] until the device is replaced.
    pub fn fail(&self) {
        self.inner.borrow_mut().failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.inner.borrow().failed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }
}

impl BlockDevice for MemBlockDevice {
    fn num_blocks(&self) -> u32 {
        self.inner.borrow().nblks
    }

    fn read(&mut self, first: u32, count: u32, buf: &mut [u8]) -> Result<(), BdError> {
        let inner = self.inner.borrow();
        if inner.closed || inner.failed {
            return Err(BdError::Unavailable);
        }
        check_bounds(first, count, inner.nblks, buf.len())?;
        let start = first as usize * BLOCK_SIZE;
        let end = start + buf.len();
        buf.copy_from_slice(&inner.blocks[start..end]);
        Ok(())
    }

    fn write(&mut self, first: u32, count: u32, buf: &[u8]) -> Result<(), BdError> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed || inner.failed {
            return Err(BdError::Unavailable);
        }
        check_bounds(first, count, inner.nblks, buf.len())?;
        let start = first as usize * BLOCK_SIZE;
        let end = start + buf.len();
        inner.blocks[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) {
        self.inner.borrow_mut().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let mut dev = MemBlockDevice::new(4);
        let data = vec![0xabu8; BLOCK_SIZE];
        dev.write(1, 1, &data).unwrap();
        let mut out = vec![0u8; BLOCK_SIZE];
        dev.read(1, 1, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn failed_disk_reports_unavailable() {
        let dev = MemBlockDevice::new(2);
        let handle = dev.clone();
        let mut dev = dev;
        handle.fail();
        let mut buf = vec![0u8; BLOCK_SIZE];
        assert!(matches!(dev.read(0, 1, &mut buf), Err(BdError::Unavailable)));
    }

    #[test]
    fn out_of_range_request_is_rejected() {
        let mut dev = MemBlockDevice::new(2);
        let mut buf = vec![0u8; BLOCK_SIZE];
        assert!(matches!(dev.read(2, 1, &mut buf), Err(BdError::Size)));
    }
}
