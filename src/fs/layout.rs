//! On-disk structures (spec.md §3 Data model). Sizes are fixed per
//! SPEC_FULL.md §3, since the original `fsx600.h` wasn't part of the
//! retrieved source: 6 direct pointers, 28-byte file names, chosen to be
//! consistent with every numeric constraint spec.md does give.
//!
//! Every on-disk struct derives `zerocopy`'s `FromBytes`/`IntoBytes` so a
//! block read straight off a [`crate::bd::BlockDevice`] can be
//! reinterpreted in place, the safe replacement for the teacher's raw
//! `ptr::read` cast.

use bitflags::bitflags;
use static_assertions::{const_assert, const_assert_eq};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::bd::BLOCK_SIZE;

pub const MAGIC: u32 = 0x5600_f5a1;

/// Block pointers are 4 bytes, so a full block of pointers holds this many.
pub const NUM_PER_BLK: usize = BLOCK_SIZE / 4;

/// Direct block pointers carried inline in every inode.
pub const N_DIRECT: usize = 6;

pub const DIRECT_SIZE: usize = N_DIRECT;
pub const INDIR1_SIZE: usize = NUM_PER_BLK;
pub const INDIR2_SIZE: usize = NUM_PER_BLK * NUM_PER_BLK;

/// Largest file this layout can address: direct + single-indirect +
/// double-indirect blocks, each `BLOCK_SIZE` bytes.
pub const MAX_FILE_BLOCKS: usize = DIRECT_SIZE + INDIR1_SIZE + INDIR2_SIZE;
pub const MAX_FILE_SIZE: u64 = (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64;

pub const NAME_LEN: usize = 28;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        const IS_DIR      = 0b0000_0001;
        const PERM_READ   = 0b0000_0010;
        const PERM_WRITE  = 0b0000_0100;
        const PERM_EXEC   = 0b0000_1000;
    }
}

/// Fixed-size on-disk inode record. `INODES_PER_BLK` of these pack
/// exactly into one block (64 bytes each, so `BLOCK_SIZE / 64 == 16`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawInode {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub direct: [u32; N_DIRECT],
    pub indir_1: u32,
    pub indir_2: u32,
    _reserved: [u32; 2],
}

pub const INODE_SIZE: usize = std::mem::size_of::<RawInode>();
pub const INODES_PER_BLK: usize = BLOCK_SIZE / INODE_SIZE;
const_assert_eq!(INODE_SIZE, 64);
const_assert_eq!(BLOCK_SIZE % INODE_SIZE, 0);

/// Sentinel meaning "no block allocated here yet".
pub const NULL_BLOCK: u32 = 0;

impl RawInode {
    pub const fn empty() -> Self {
        RawInode {
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            ctime: 0,
            mtime: 0,
            direct: [NULL_BLOCK; N_DIRECT],
            indir_1: NULL_BLOCK,
            indir_2: NULL_BLOCK,
            _reserved: [0; 2],
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_bits_truncate(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.mode().contains(Mode::IS_DIR)
    }

    pub fn is_allocated(&self) -> bool {
        self.ctime != 0 || self.mtime != 0 || self.mode != 0
    }
}

/// One directory entry: a fixed 28-byte name plus the inode it names.
/// `inode == 0` marks a free slot (inode 0 is reserved: it can never be a
/// real file, matching the bitmap convention of bit 0 "always allocated").
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DirEntry {
    pub inode: u32,
    pub name: [u8; NAME_LEN],
}

pub const DIRENT_SIZE: usize = std::mem::size_of::<DirEntry>();
pub const N_ENTRIES: usize = BLOCK_SIZE / DIRENT_SIZE;
const_assert_eq!(DIRENT_SIZE, 32);
const_assert_eq!(BLOCK_SIZE % DIRENT_SIZE, 0);

impl DirEntry {
    pub const FREE: DirEntry = DirEntry {
        inode: 0,
        name: [0u8; NAME_LEN],
    };

    pub fn is_free(&self) -> bool {
        self.inode == 0
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), super::FsError> {
        let bytes = name.as_bytes();
        // leave room for the implicit NUL terminator `name_str` relies on.
        if bytes.is_empty() || bytes.len() >= NAME_LEN {
            return Err(super::FsError::Invalid);
        }
        self.name = [0u8; NAME_LEN];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Block 0 of every mounted volume.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Superblock {
    pub magic: u32,
    pub num_blocks: u32,
    pub num_inodes: u32,
    pub inode_bitmap_start: u32,
    pub inode_bitmap_blocks: u32,
    pub block_bitmap_start: u32,
    pub block_bitmap_blocks: u32,
    pub inode_table_start: u32,
    pub inode_table_blocks: u32,
    pub data_start: u32,
    pub root_inode: u32,
    _reserved: u32,
}

pub const SUPERBLOCK_SIZE: usize = std::mem::size_of::<Superblock>();
const_assert!(BLOCK_SIZE >= SUPERBLOCK_SIZE);

impl Superblock {
    /// Lay out a fresh volume of `num_blocks` blocks with `num_inodes`
    /// inodes, in the fixed block order: superblock, inode bitmap, block
    /// bitmap, inode table, data.
    pub fn layout(num_blocks: u32, num_inodes: u32) -> Self {
        let inode_bitmap_blocks = div_ceil(num_inodes as usize, BLOCK_SIZE * 8) as u32;
        let inode_table_blocks = div_ceil(num_inodes as usize, INODES_PER_BLK) as u32;
        // block bitmap sizing is self-referential (more data blocks needs
        // more bitmap blocks); one correction pass is enough since adding
        // a bitmap block can add at most one more bit's worth of blocks
        // to account for.
        let mut block_bitmap_blocks = 1u32;
        loop {
            let metadata_blocks = 1 + inode_bitmap_blocks + block_bitmap_blocks + inode_table_blocks;
            let data_blocks = num_blocks.saturating_sub(metadata_blocks);
            let needed = div_ceil(data_blocks as usize, BLOCK_SIZE * 8) as u32;
            let needed = needed.max(1);
            if needed == block_bitmap_blocks {
                break;
            }
            block_bitmap_blocks = needed;
        }
        let inode_bitmap_start = 1;
        let block_bitmap_start = inode_bitmap_start + inode_bitmap_blocks;
        let inode_table_start = block_bitmap_start + block_bitmap_blocks;
        let data_start = inode_table_start + inode_table_blocks;
        Superblock {
            magic: MAGIC,
            num_blocks,
            num_inodes,
            inode_bitmap_start,
            inode_bitmap_blocks,
            block_bitmap_start,
            block_bitmap_blocks,
            inode_table_start,
            inode_table_blocks,
            data_start,
            root_inode: 1,
            _reserved: 0,
        }
    }

    pub fn num_data_blocks(&self) -> u32 {
        self.num_blocks - self.data_start
    }
}

fn div_ceil(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}
