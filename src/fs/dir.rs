//! Directory contents: a single fixed data block of [`DirEntry`] records
//! (spec.md §3 Directory; spec.md §4.3 mknod/mkdir/unlink/rmdir).
//!
//! Directories in this layout never grow past their first direct block —
//! once its `N_ENTRIES` slots are full, further `mknod`/`mkdir` calls fail
//! with [`FsError::NoSpace`], matching the original's fixed single-block
//! directory.

use itertools::Itertools;
use zerocopy::{FromBytes, IntoBytes};

use crate::bd::{BlockDevice, BLOCK_SIZE};

use super::error::FsError;
use super::layout::{DirEntry, DIRENT_SIZE, N_ENTRIES};

/// Read every entry (free slots included) out of `block`.
pub fn read_entries(bd: &mut dyn BlockDevice, block: u32) -> Result<Vec<DirEntry>, FsError> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    bd.read(block, 1, &mut buf)?;
    Ok((0..N_ENTRIES)
        .map(|i| {
            let off = i * DIRENT_SIZE;
            DirEntry::read_from_bytes(&buf[off..off + DIRENT_SIZE]).expect("DIRENT_SIZE matches its slot")
        })
        .collect())
}

fn write_entries(bd: &mut dyn BlockDevice, block: u32, entries: &[DirEntry]) -> Result<(), FsError> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    for (i, e) in entries.iter().enumerate() {
        let off = i * DIRENT_SIZE;
        e.write_to(&mut buf[off..off + DIRENT_SIZE]).expect("DIRENT_SIZE matches its slot");
    }
    bd.write(block, 1, &buf)?;
    Ok(())
}

/// Look up `name` among the block's entries, returning its inode number.
pub fn lookup(bd: &mut dyn BlockDevice, block: u32, name: &str) -> Result<Option<u32>, FsError> {
    let entries = read_entries(bd, block)?;
    Ok(entries
        .iter()
        .find(|e| !e.is_free() && e.name_str() == name)
        .map(|e| e.inode))
}

/// Insert a new `(name, inode)` entry into the first free slot.
pub fn insert(bd: &mut dyn BlockDevice, block: u32, name: &str, inode: u32) -> Result<(), FsError> {
    let mut entries = read_entries(bd, block)?;
    if entries.iter().any(|e| !e.is_free() && e.name_str() == name) {
        return Err(FsError::Exists);
    }
    let slot = entries.iter().position(|e| e.is_free()).ok_or(FsError::NoSpace)?;
    entries[slot].inode = inode;
    entries[slot].set_name(name)?;
    write_entries(bd, block, &entries)
}

/// Remove the entry named `name`, returning its inode number.
pub fn remove(bd: &mut dyn BlockDevice, block: u32, name: &str) -> Result<u32, FsError> {
    let mut entries = read_entries(bd, block)?;
    let (slot, entry) = entries
        .iter()
        .find_position(|e| !e.is_free() && e.name_str() == name)
        .ok_or(FsError::NotFound)?;
    let ino = entry.inode;
    entries[slot] = DirEntry::FREE;
    write_entries(bd, block, &entries)?;
    Ok(ino)
}

/// Change `old_name`'s entry to `new_name` in place, preserving its slot
/// and inode number (spec.md §4.3 rename: "update entry name in place").
pub fn rename(bd: &mut dyn BlockDevice, block: u32, old_name: &str, new_name: &str, inode: u32) -> Result<(), FsError> {
    let mut entries = read_entries(bd, block)?;
    let slot = entries
        .iter()
        .position(|e| !e.is_free() && e.name_str() == old_name)
        .ok_or(FsError::NotFound)?;
    entries[slot].set_name(new_name)?;
    entries[slot].inode = inode;
    write_entries(bd, block, &entries)
}

/// Every non-free `(name, inode)` pair, in slot order.
pub fn list(bd: &mut dyn BlockDevice, block: u32) -> Result<Vec<(String, u32)>, FsError> {
    let entries = read_entries(bd, block)?;
    Ok(entries
        .iter()
        .filter(|e| !e.is_free())
        .map(|e| (e.name_str().to_string(), e.inode))
        .collect())
}

pub fn is_empty(bd: &mut dyn BlockDevice, block: u32) -> Result<bool, FsError> {
    Ok(read_entries(bd, block)?.iter().all(DirEntry::is_free))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bd::mem::MemBlockDevice;

    #[test]
    fn insert_lookup_remove_round_trip() {
        let mut dev = MemBlockDevice::new(2);
        insert(&mut dev, 0, "alpha", 5).unwrap();
        insert(&mut dev, 0, "beta", 6).unwrap();
        assert_eq!(lookup(&mut dev, 0, "alpha").unwrap(), Some(5));
        assert_eq!(lookup(&mut dev, 0, "missing").unwrap(), None);
        assert_eq!(remove(&mut dev, 0, "alpha").unwrap(), 5);
        assert_eq!(lookup(&mut dev, 0, "alpha").unwrap(), None);
        assert_eq!(list(&mut dev, 0).unwrap(), vec![("beta".to_string(), 6)]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut dev = MemBlockDevice::new(2);
        insert(&mut dev, 0, "dup", 1).unwrap();
        assert!(matches!(insert(&mut dev, 0, "dup", 2), Err(FsError::Exists)));
    }

    #[test]
    fn full_directory_reports_no_space() {
        let mut dev = MemBlockDevice::new(2);
        for i in 0..N_ENTRIES {
            insert(&mut dev, 0, &format!("f{i}"), i as u32 + 1).unwrap();
        }
        assert!(matches!(insert(&mut dev, 0, "one_too_many", 999), Err(FsError::NoSpace)));
    }
}
