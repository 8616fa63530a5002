//! RAID-4 (striping plus a dedicated parity disk), grounded on
//! `raid4_create`/`raid4_read`/`raid4_write`/`parity`/`recover_data` in
//! `examples/original_source/hw3/homework.c`.

use log::warn;

use crate::bd::{check_bounds, BdError, BlockDevice, BLOCK_SIZE};

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

enum Side {
    Ok,
    /// This side didn't write (it's already the known-degraded disk, or
    /// the volume has no disk at this slot); doesn't by itself fail the
    /// request, as long as the other side succeeded.
    Degraded,
    /// A distinct, second disk just failed: the volume cannot serve this
    /// request (or any future one touching both disks) anymore.
    Terminal(BdError),
}

/// `disks.len() - 1` data disks plus one parity disk, the last slot.
/// Tolerates exactly one disk being unavailable at a time (degraded reads
/// reconstruct via XOR across survivors; degraded writes skip the missing
/// side and rely on the other one). A second, distinct disk failure is
/// terminal (spec.md §4.2.3 invariants).
pub struct Stripe4 {
    disks: Vec<Option<Box<dyn BlockDevice>>>,
    unit: u32,
    nblks: u32,
    last_failed: Option<usize>,
}

impl Stripe4 {
    pub fn create(disks: Vec<Box<dyn BlockDevice>>, unit: u32) -> Result<Self, BdError> {
        if disks.len() < 2 || unit == 0 {
            return Err(BdError::Size);
        }
        let child_blocks = disks[0].num_blocks();
        if disks.iter().any(|d| d.num_blocks() != child_blocks) {
            return Err(BdError::Size);
        }
        let ndata = disks.len() as u32 - 1;
        let stripes_per_disk = child_blocks / unit;
        let nblks = stripes_per_disk * unit * ndata;
        Ok(Stripe4 {
            disks: disks.into_iter().map(Some).collect(),
            unit,
            nblks,
            last_failed: None,
        })
    }

    fn ndata(&self) -> u32 {
        self.disks.len() as u32 - 1
    }

    fn parity_idx(&self) -> usize {
        self.disks.len() - 1
    }

    fn locate(&self, i: u32) -> (usize, u32) {
        let ndata = self.ndata();
        let disk = (i / self.unit) % ndata;
        let stripe = i / (self.unit * ndata);
        let offset = stripe * self.unit + (i % self.unit);
        (disk as usize, offset)
    }

    fn close_slot(&mut self, i: usize) {
        if let Some(mut d) = self.disks[i].take() {
            warn!("stripe4: disk {i} unavailable, closing it");
            d.close();
        }
    }

    /// Read one block from `idx`, reconstructing via parity if `idx` is
    /// the currently degraded disk (or already nulled). A *new* failure
    /// discovered here is recorded as the single permitted fault; a
    /// *second distinct* failure is terminal.
    fn read_side(&mut self, idx: usize, blk: u32, buf: &mut [u8]) -> Result<(), BdError> {
        if Some(idx) == self.last_failed || self.disks[idx].is_none() {
            return self.reconstruct(idx, blk, buf);
        }
        match self.disks[idx].as_deref_mut().unwrap().read(blk, 1, buf) {
            Ok(()) => Ok(()),
            Err(BdError::Unavailable) => {
                if self.last_failed.is_some() {
                    self.close_slot(idx);
                    return Err(BdError::Unavailable);
                }
                self.last_failed = Some(idx);
                self.close_slot(idx);
                self.reconstruct(idx, blk, buf)
            }
            Err(e) => Err(e),
        }
    }

    /// Reconstruct the block that would live at `(missing_idx, blk)` by
    /// XORing the same block position across every other disk.
    fn reconstruct(&mut self, missing_idx: usize, blk: u32, buf: &mut [u8]) -> Result<(), BdError> {
        let n = self.disks.len();
        for b in buf.iter_mut() {
            *b = 0;
        }
        let mut tmp = vec![0u8; BLOCK_SIZE];
        for idx in 0..n {
            if idx == missing_idx {
                continue;
            }
            let Some(d) = self.disks[idx].as_deref_mut() else {
                // a second disk is already gone: can't reconstruct.
                return Err(BdError::Unavailable);
            };
            match d.read(blk, 1, &mut tmp) {
                Ok(()) => xor_into(buf, &tmp),
                Err(BdError::Unavailable) => {
                    self.close_slot(idx);
                    return Err(BdError::Unavailable);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_side(&mut self, idx: usize, blk: u32, buf: &[u8]) -> Side {
        if Some(idx) == self.last_failed || self.disks[idx].is_none() {
            return Side::Degraded;
        }
        match self.disks[idx].as_deref_mut().unwrap().write(blk, 1, buf) {
            Ok(()) => Side::Ok,
            Err(BdError::Unavailable) => {
                if self.last_failed.is_some() {
                    self.close_slot(idx);
                    Side::Terminal(BdError::Unavailable)
                } else {
                    self.last_failed = Some(idx);
                    self.close_slot(idx);
                    Side::Degraded
                }
            }
            Err(e) => Side::Terminal(e),
        }
    }

    /// Rebuild a replacement disk for slot `i` by XORing the corresponding
    /// block across every other (surviving) disk, then install it and
    /// clear the degraded marker.
    pub fn replace(&mut self, i: usize, mut new: Box<dyn BlockDevice>) -> Result<(), BdError> {
        let child_blocks = self
            .disks
            .iter()
            .flatten()
            .map(|d| d.num_blocks())
            .next()
            .ok_or(BdError::Unavailable)?;
        if new.num_blocks() != child_blocks {
            new.close();
            return Err(BdError::Size);
        }
        // closes `new` on every early `?` return below; defused on success.
        let mut new = scopeguard::guard(new, |mut d| d.close());
        let mut buf = vec![0u8; BLOCK_SIZE];
        for blk in 0..child_blocks {
            self.reconstruct(i, blk, &mut buf)?;
            new.write(blk, 1, &buf)?;
        }
        self.close_slot(i);
        self.disks[i] = Some(scopeguard::ScopeGuard::into_inner(new));
        self.last_failed = None;
        Ok(())
    }
}

impl BlockDevice for Stripe4 {
    fn num_blocks(&self) -> u32 {
        self.nblks
    }

    fn read(&mut self, first: u32, count: u32, buf: &mut [u8]) -> Result<(), BdError> {
        check_bounds(first, count, self.nblks, buf.len())?;
        for (n, chunk) in buf.chunks_mut(BLOCK_SIZE).enumerate() {
            let (disk, blk) = self.locate(first + n as u32);
            self.read_side(disk, blk, chunk)?;
        }
        Ok(())
    }

    fn write(&mut self, first: u32, count: u32, buf: &[u8]) -> Result<(), BdError> {
        check_bounds(first, count, self.nblks, buf.len())?;
        let parity = self.parity_idx();
        for (n, chunk) in buf.chunks(BLOCK_SIZE).enumerate() {
            let (disk, blk) = self.locate(first + n as u32);
            let mut old_data = vec![0u8; BLOCK_SIZE];
            let mut old_parity = vec![0u8; BLOCK_SIZE];
            self.read_side(disk, blk, &mut old_data)?;
            self.read_side(parity, blk, &mut old_parity)?;

            let mut new_parity = old_parity;
            xor_into(&mut new_parity, &old_data);
            xor_into(&mut new_parity, chunk);

            let data_res = self.write_side(disk, blk, chunk);
            if let Side::Terminal(e) = data_res {
                return Err(e);
            }
            let parity_res = self.write_side(parity, blk, &new_parity);
            if let Side::Terminal(e) = parity_res {
                return Err(e);
            }
            if matches!(data_res, Side::Degraded) && matches!(parity_res, Side::Degraded) {
                return Err(BdError::Unavailable);
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
