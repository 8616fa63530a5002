//! Host-file-backed leaf block device (parallels the original `blkdev.c`,
//! which this crate's retrieval pack did not include source for; behavior
//! is inferred from spec.md §2's description of an image-file leaf).

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::io::AsRawFd;

use super::{check_bounds, BdError, BlockDevice, BLOCK_SIZE};

/// A disk backed by a regular host file of exactly `num_blocks * BLOCK_SIZE`
/// bytes. `fail()` simulates the underlying file descriptor having gone
/// bad (e.g. the backing device was unplugged) without actually touching
/// the host file system.
pub struct FileBlockDevice {
    file: Option<File>,
    nblks: u32,
    failed: bool,
}

impl FileBlockDevice {
    /// Open an existing image file; its size must be an exact multiple of
    /// [`BLOCK_SIZE`].
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, BdError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len as usize % BLOCK_SIZE != 0 {
            return Err(BdError::Size);
        }
        Ok(FileBlockDevice {
            file: Some(file),
            nblks: (len as usize / BLOCK_SIZE) as u32,
            failed: false,
        })
    }

    /// Create a fresh zero-filled image file holding `nblks` blocks.
    pub fn create(path: impl AsRef<std::path::Path>, nblks: u32) -> Result<Self, BdError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(nblks as u64 * BLOCK_SIZE as u64)?;
        Ok(FileBlockDevice {
            file: Some(file),
            nblks,
            failed: false,
        })
    }

    pub fn fail(&mut self) {
        self.failed = true;
    }
}

impl BlockDevice for FileBlockDevice {
    fn num_blocks(&self) -> u32 {
        self.nblks
    }

    fn read(&mut self, first: u32, count: u32, buf: &mut [u8]) -> Result<(), BdError> {
        if self.failed {
            return Err(BdError::Unavailable);
        }
        check_bounds(first, count, self.nblks, buf.len())?;
        let file = self.file.as_mut().ok_or(BdError::Unavailable)?;
        file.seek(SeekFrom::Start(first as u64 * BLOCK_SIZE as u64))?;
        std::io::Read::read_exact(file, buf)?;
        Ok(())
    }

    fn write(&mut self, first: u32, count: u32, buf: &[u8]) -> Result<(), BdError> {
        if self.failed {
            return Err(BdError::Unavailable);
        }
        check_bounds(first, count, self.nblks, buf.len())?;
        let file = self.file.as_mut().ok_or(BdError::Unavailable)?;
        file.seek(SeekFrom::Start(first as u64 * BLOCK_SIZE as u64))?;
        std::io::Write::write_all(file, buf)?;
        file.sync_data()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            unsafe {
                libc::fsync(file.as_raw_fd());
            }
        }
        self.failed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut dev = FileBlockDevice::create(&path, 8).unwrap();
        assert_eq!(dev.num_blocks(), 8);
        let data = vec![0x5au8; BLOCK_SIZE];
        dev.write(3, 1, &data).unwrap();
        let mut out = vec![0u8; BLOCK_SIZE];
        dev.read(3, 1, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn reopen_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        {
            let mut dev = FileBlockDevice::create(&path, 4).unwrap();
            dev.write(0, 1, &[0x11u8; BLOCK_SIZE]).unwrap();
        }
        let mut dev = FileBlockDevice::open(&path).unwrap();
        let mut out = vec![0u8; BLOCK_SIZE];
        dev.read(0, 1, &mut out).unwrap();
        assert_eq!(out, vec![0x11u8; BLOCK_SIZE]);
    }
}
