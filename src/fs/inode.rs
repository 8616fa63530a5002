//! In-memory inode table and direct/indirect/double-indirect block-address
//! arithmetic (spec.md §4.3 block-address arithmetic).
//!
//! The whole table is cached in RAM at mount time (it's small and fixed
//! size); every mutation follows the write-through discipline from
//! spec.md §4.3: the in-RAM copy is updated first, then exactly the one
//! block it lives in is rewritten.

use zerocopy::{FromBytes, IntoBytes};

use crate::bd::{BdError, BlockDevice, BLOCK_SIZE};

use super::bitmap::Bitmap;
use super::error::FsError;
use super::layout::{
    RawInode, DIRECT_SIZE, INDIR1_SIZE, INDIR2_SIZE, INODES_PER_BLK, INODE_SIZE, NULL_BLOCK, NUM_PER_BLK,
};

pub struct InodeTable {
    inodes: Vec<RawInode>,
    table_start: u32,
}

fn alloc_data_block(bitmap: &mut Bitmap, data_start: u32) -> Result<u32, FsError> {
    bitmap.alloc_first_clear().map(|i| data_start + i as u32).ok_or(FsError::NoSpace)
}

fn zero_block(bd: &mut dyn BlockDevice, blk: u32) -> Result<(), BdError> {
    bd.write(blk, 1, &vec![0u8; BLOCK_SIZE])
}

impl InodeTable {
    pub fn load(
        bd: &mut dyn BlockDevice,
        table_start: u32,
        table_blocks: u32,
        num_inodes: u32,
    ) -> Result<Self, FsError> {
        let mut inodes = Vec::with_capacity(num_inodes as usize);
        let mut buf = vec![0u8; BLOCK_SIZE];
        'outer: for b in 0..table_blocks {
            bd.read(table_start + b, 1, &mut buf)?;
            for i in 0..INODES_PER_BLK {
                if inodes.len() >= num_inodes as usize {
                    break 'outer;
                }
                let off = i * INODE_SIZE;
                let inode = RawInode::read_from_bytes(&buf[off..off + INODE_SIZE])
                    .map_err(|_| FsError::Corrupt)?;
                inodes.push(inode);
            }
        }
        Ok(InodeTable { inodes, table_start })
    }

    /// Write an all-zero table to disk for a freshly formatted volume,
    /// then load it back (cheaper than special-casing "format" vs "mount").
    pub fn format(
        bd: &mut dyn BlockDevice,
        table_start: u32,
        table_blocks: u32,
        num_inodes: u32,
    ) -> Result<Self, FsError> {
        for b in 0..table_blocks {
            zero_block(bd, table_start + b)?;
        }
        InodeTable::load(bd, table_start, table_blocks, num_inodes)
    }

    pub fn num_inodes(&self) -> u32 {
        self.inodes.len() as u32
    }

    pub fn get(&self, ino: u32) -> Result<&RawInode, FsError> {
        self.inodes.get(ino as usize).ok_or(FsError::NotFound)
    }

    pub fn get_mut(&mut self, ino: u32) -> Result<&mut RawInode, FsError> {
        self.inodes.get_mut(ino as usize).ok_or(FsError::NotFound)
    }

    /// Rewrite the single on-disk block that holds `ino`'s slot.
    pub fn flush(&self, ino: u32, bd: &mut dyn BlockDevice) -> Result<(), FsError> {
        let block_idx = ino as usize / INODES_PER_BLK;
        let start = block_idx * INODES_PER_BLK;
        let end = (start + INODES_PER_BLK).min(self.inodes.len());
        let mut buf = vec![0u8; BLOCK_SIZE];
        for (i, inode) in self.inodes[start..end].iter().enumerate() {
            let off = i * INODE_SIZE;
            inode
                .write_to(&mut buf[off..off + INODE_SIZE])
                .expect("INODE_SIZE matches its table slot");
        }
        bd.write(self.table_start + block_idx as u32, 1, &buf)?;
        Ok(())
    }

    /// Allocate a fresh inode (first clear bit in `bitmap`), initialize it
    /// to `init`, and flush it.
    pub fn alloc(&mut self, bitmap: &mut Bitmap, init: RawInode, bd: &mut dyn BlockDevice) -> Result<u32, FsError> {
        let ino = bitmap.alloc_first_clear().ok_or(FsError::NoSpace)? as u32;
        if ino as usize >= self.inodes.len() {
            bitmap.clear(ino as usize);
            return Err(FsError::NoSpace);
        }
        *self.get_mut(ino)? = init;
        self.flush(ino, bd)?;
        Ok(ino)
    }

    /// Free every block owned by `ino`: direct blocks, the blocks `indir_1`
    /// points to plus `indir_1` itself, and the two levels of blocks
    /// `indir_2` points to plus `indir_2` itself. Leaves the inode's other
    /// fields untouched; callers decide what to do with the record.
    fn free_blocks(&mut self, ino: u32, bitmap: &mut Bitmap, data_start: u32, bd: &mut dyn BlockDevice) -> Result<(), FsError> {
        let inode = *self.get(ino)?;
        for &blk in inode.direct.iter() {
            free_block(bitmap, data_start, blk);
        }
        if inode.indir_1 != NULL_BLOCK {
            free_pointer_block(bitmap, data_start, inode.indir_1, bd)?;
        }
        if inode.indir_2 != NULL_BLOCK {
            let mut outer_buf = vec![0u8; BLOCK_SIZE];
            bd.read(inode.indir_2, 1, &mut outer_buf)?;
            for i in 0..NUM_PER_BLK {
                let ptr = read_ptr(&outer_buf, i);
                if ptr != NULL_BLOCK {
                    free_pointer_block(bitmap, data_start, ptr, bd)?;
                }
            }
            free_block(bitmap, data_start, inode.indir_2);
        }
        Ok(())
    }

    /// Free every data and index block owned by `ino`, then clear its slot
    /// entirely (spec.md §4.3 unlink/rmdir: "clear inode and bitmap bit").
    pub fn free(&mut self, ino: u32, bitmap: &mut Bitmap, data_start: u32, bd: &mut dyn BlockDevice) -> Result<(), FsError> {
        self.free_blocks(ino, bitmap, data_start, bd)?;
        *self.get_mut(ino)? = RawInode::empty();
        self.flush(ino, bd)?;
        Ok(())
    }

    /// `truncate(path, 0)`: free every block the file owns (spec.md §4.3
    /// truncate) and zero `size`/`direct`/`indir_1`/`indir_2`, but keep the
    /// inode itself allocated with its other fields (mode, uid, gid, times)
    /// untouched.
    pub fn truncate_to_empty(&mut self, ino: u32, bitmap: &mut Bitmap, data_start: u32, bd: &mut dyn BlockDevice) -> Result<(), FsError> {
        self.free_blocks(ino, bitmap, data_start, bd)?;
        let inode = self.get_mut(ino)?;
        inode.size = 0;
        inode.direct = [NULL_BLOCK; DIRECT_SIZE];
        inode.indir_1 = NULL_BLOCK;
        inode.indir_2 = NULL_BLOCK;
        self.flush(ino, bd)?;
        Ok(())
    }

    fn ensure_indirect_field(
        &mut self,
        ino: u32,
        which: IndirField,
        alloc: bool,
        bitmap: &mut Bitmap,
        data_start: u32,
        bd: &mut dyn BlockDevice,
    ) -> Result<u32, FsError> {
        let cur = match which {
            IndirField::Single => self.get(ino)?.indir_1,
            IndirField::Double => self.get(ino)?.indir_2,
        };
        if cur != NULL_BLOCK {
            return Ok(cur);
        }
        if !alloc {
            return Ok(NULL_BLOCK);
        }
        let blk = alloc_data_block(bitmap, data_start)?;
        zero_block(bd, blk)?;
        match which {
            IndirField::Single => self.get_mut(ino)?.indir_1 = blk,
            IndirField::Double => self.get_mut(ino)?.indir_2 = blk,
        }
        self.flush(ino, bd)?;
        Ok(blk)
    }

    fn pointer_in_block(
        &self,
        container: u32,
        idx: usize,
        alloc: bool,
        bitmap: &mut Bitmap,
        data_start: u32,
        bd: &mut dyn BlockDevice,
    ) -> Result<u32, FsError> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        bd.read(container, 1, &mut buf)?;
        let mut val = read_ptr(&buf, idx);
        if val == NULL_BLOCK {
            if !alloc {
                return Ok(NULL_BLOCK);
            }
            val = alloc_data_block(bitmap, data_start)?;
            zero_block(bd, val)?;
            write_ptr(&mut buf, idx, val);
            bd.write(container, 1, &buf)?;
        }
        Ok(val)
    }

    /// Resolve the `logical`-th block of `ino`'s data, allocating
    /// direct/indirect index blocks and the data block itself on demand
    /// when `alloc` is set. Returns `0` (no such block yet) when `alloc`
    /// is false and the block was never written.
    pub fn block_at(
        &mut self,
        ino: u32,
        logical: usize,
        alloc: bool,
        bitmap: &mut Bitmap,
        data_start: u32,
        bd: &mut dyn BlockDevice,
    ) -> Result<u32, FsError> {
        if logical < DIRECT_SIZE {
            let cur = self.get(ino)?.direct[logical];
            if cur != NULL_BLOCK {
                return Ok(cur);
            }
            if !alloc {
                return Ok(NULL_BLOCK);
            }
            let blk = alloc_data_block(bitmap, data_start)?;
            zero_block(bd, blk)?;
            self.get_mut(ino)?.direct[logical] = blk;
            self.flush(ino, bd)?;
            return Ok(blk);
        }
        let logical = logical - DIRECT_SIZE;
        if logical < INDIR1_SIZE {
            let ind = self.ensure_indirect_field(ino, IndirField::Single, alloc, bitmap, data_start, bd)?;
            if ind == NULL_BLOCK {
                return Ok(NULL_BLOCK);
            }
            return self.pointer_in_block(ind, logical, alloc, bitmap, data_start, bd);
        }
        let logical = logical - INDIR1_SIZE;
        if logical < INDIR2_SIZE {
            let ind2 = self.ensure_indirect_field(ino, IndirField::Double, alloc, bitmap, data_start, bd)?;
            if ind2 == NULL_BLOCK {
                return Ok(NULL_BLOCK);
            }
            let outer = logical / NUM_PER_BLK;
            let inner = logical % NUM_PER_BLK;
            let inner_blk = self.pointer_in_block(ind2, outer, alloc, bitmap, data_start, bd)?;
            if inner_blk == NULL_BLOCK {
                return Ok(NULL_BLOCK);
            }
            return self.pointer_in_block(inner_blk, inner, alloc, bitmap, data_start, bd);
        }
        Err(FsError::Size)
    }
}

#[derive(Clone, Copy)]
enum IndirField {
    Single,
    Double,
}

fn free_block(bitmap: &mut Bitmap, data_start: u32, blk: u32) {
    if blk == NULL_BLOCK {
        return;
    }
    let idx = (blk - data_start) as usize;
    if idx < bitmap.len() {
        bitmap.clear(idx);
    }
}

fn free_pointer_block(bitmap: &mut Bitmap, data_start: u32, blk: u32, bd: &mut dyn BlockDevice) -> Result<(), FsError> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    bd.read(blk, 1, &mut buf)?;
    for i in 0..NUM_PER_BLK {
        free_block(bitmap, data_start, read_ptr(&buf, i));
    }
    free_block(bitmap, data_start, blk);
    Ok(())
}

fn read_ptr(buf: &[u8], idx: usize) -> u32 {
    let off = idx * 4;
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_ptr(buf: &mut [u8], idx: usize, val: u32) {
    let off = idx * 4;
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}
