//! RAID-0 (striping, no redundancy), grounded on `raid0_create`/`raid0_read`/
//! `raid0_write` in `examples/original_source/hw3/homework.c`.

use log::warn;

use crate::bd::{check_bounds, BdError, BlockDevice};

/// Blocks are striped across `disks.len()` children, `unit` blocks at a
/// time. There is no redundancy: once any child reports `Unavailable` its
/// slot is closed and nulled, and the volume is permanently failed for any
/// request touching it (spec.md §9 "no rebuild" decision).
pub struct Stripe0 {
    disks: Vec<Option<Box<dyn BlockDevice>>>,
    unit: u32,
    nblks: u32,
}

impl Stripe0 {
    pub fn create(disks: Vec<Box<dyn BlockDevice>>, unit: u32) -> Result<Self, BdError> {
        if disks.is_empty() || unit == 0 {
            return Err(BdError::Size);
        }
        let child_blocks = disks[0].num_blocks();
        if disks.iter().any(|d| d.num_blocks() != child_blocks) {
            return Err(BdError::Size);
        }
        let stripes_per_disk = child_blocks / unit;
        let nblks = stripes_per_disk * unit * disks.len() as u32;
        Ok(Stripe0 {
            disks: disks.into_iter().map(Some).collect(),
            unit,
            nblks,
        })
    }

    /// Map a volume block number to `(disk index, block number on that disk)`.
    fn locate(&self, i: u32) -> (usize, u32) {
        let n = self.disks.len() as u32;
        let disk = (i / self.unit) % n;
        let stripe = i / (self.unit * n);
        let offset = stripe * self.unit + (i % self.unit);
        (disk as usize, offset)
    }

    fn close_slot(&mut self, i: usize) {
        if let Some(mut d) = self.disks[i].take() {
            warn!("stripe0: disk {i} unavailable, volume is now permanently failed");
            d.close();
        }
    }
}

impl BlockDevice for Stripe0 {
    fn num_blocks(&self) -> u32 {
        self.nblks
    }

    fn read(&mut self, first: u32, count: u32, buf: &mut [u8]) -> Result<(), BdError> {
        check_bounds(first, count, self.nblks, buf.len())?;
        for (n, chunk) in buf.chunks_mut(crate::bd::BLOCK_SIZE).enumerate() {
            let (disk, blk) = self.locate(first + n as u32);
            match self.disks[disk].as_deref_mut() {
                None => return Err(BdError::Unavailable),
                Some(d) => match d.read(blk, 1, chunk) {
                    Ok(()) => {}
                    Err(BdError::Unavailable) => {
                        self.close_slot(disk);
                        return Err(BdError::Unavailable);
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(())
    }

    fn write(&mut self, first: u32, count: u32, buf: &[u8]) -> Result<(), BdError> {
        check_bounds(first, count, self.nblks, buf.len())?;
        for (n, chunk) in buf.chunks(crate::bd::BLOCK_SIZE).enumerate() {
            let (disk, blk) = self.locate(first + n as u32);
            match self.disks[disk].as_deref_mut() {
                None => return Err(BdError::Unavailable),
                Some(d) => match d.write(blk, 1, chunk) {
                    Ok(()) => {}
                    Err(BdError::Unavailable) => {
                        self.close_slot(disk);
                        return Err(BdError::Unavailable);
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        for i in 0..self.disks.len() {
            self.close_slot(i);
        }
    }
}
