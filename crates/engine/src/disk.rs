//! The backing "disk image" (`spec.md` §1): a byte-addressed blob behind a
//! simple read/write/erase interface, keyed by LBA. Three flavors cover
//! the spec's memory-only, file-backed and copy-on-write variants.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Uniform interface the FTL/ICL's final media read/write lands on.
pub trait DiskBackend: std::fmt::Debug + Send {
    fn lba_size(&self) -> u32;

    fn read(&mut self, lba: u64, buf: &mut [u8]);
    fn write(&mut self, lba: u64, buf: &[u8]);

    /// Erase `count` LBAs starting at `lba` (zero-fill).
    fn erase(&mut self, lba: u64, count: u64) {
        let lba_size = self.lba_size() as usize;
        let zeros = vec![0u8; lba_size];
        for i in 0..count {
            self.write(lba + i, &zeros);
        }
    }
}

/// Sparse, memory-only disk: unwritten LBAs read as zero.
#[derive(Debug, Default)]
pub struct MemoryDisk {
    lba_size: u32,
    data: HashMap<u64, Vec<u8>>,
}

impl MemoryDisk {
    pub fn new(lba_size: u32) -> Self {
        Self {
            lba_size,
            data: HashMap::new(),
        }
    }
}

impl DiskBackend for MemoryDisk {
    fn lba_size(&self) -> u32 {
        self.lba_size
    }

    fn read(&mut self, lba: u64, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        match self.data.get(&lba) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }
    }

    fn write(&mut self, lba: u64, buf: &[u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        self.data.insert(lba, buf.to_vec());
    }

    fn erase(&mut self, lba: u64, count: u64) {
        for i in 0..count {
            self.data.remove(&(lba + i));
        }
    }
}

/// Plain file-backed disk: every LBA maps directly to an offset in the
/// file, which is grown to fit on first write past its current length.
#[derive(Debug)]
pub struct FileDisk {
    lba_size: u32,
    file: File,
}

impl FileDisk {
    pub fn create(path: impl AsRef<Path>, lba_size: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { lba_size, file })
    }

    fn offset(&self, lba: u64) -> u64 {
        lba * self.lba_size as u64
    }
}

impl DiskBackend for FileDisk {
    fn lba_size(&self) -> u32 {
        self.lba_size
    }

    fn read(&mut self, lba: u64, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        let offset = self.offset(lba);
        let len = self.file.metadata().map(|m| m.len()).unwrap_or(0);
        if offset >= len {
            buf.fill(0);
            return;
        }
        self.file.seek(SeekFrom::Start(offset)).expect("seek");
        let readable = ((len - offset) as usize).min(buf.len());
        self.file
            .read_exact(&mut buf[..readable])
            .expect("short read on backing file");
        buf[readable..].fill(0);
    }

    fn write(&mut self, lba: u64, buf: &[u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        let offset = self.offset(lba);
        self.file.seek(SeekFrom::Start(offset)).expect("seek");
        self.file.write_all(buf).expect("write to backing file");
    }
}

/// Copy-on-write disk: reads fall through to an immutable base file until
/// overwritten, after which the overlay serves the LBA from memory. The
/// base file is never mutated.
#[derive(Debug)]
pub struct CowDisk {
    lba_size: u32,
    base: Option<File>,
    overlay: HashMap<u64, Vec<u8>>,
}

impl CowDisk {
    pub fn new(lba_size: u32, base: Option<File>) -> Self {
        Self {
            lba_size,
            base,
            overlay: HashMap::new(),
        }
    }
}

impl DiskBackend for CowDisk {
    fn lba_size(&self) -> u32 {
        self.lba_size
    }

    fn read(&mut self, lba: u64, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        if let Some(block) = self.overlay.get(&lba) {
            buf.copy_from_slice(block);
            return;
        }
        match &mut self.base {
            Some(file) => {
                let offset = lba * self.lba_size as u64;
                let len = file.metadata().map(|m| m.len()).unwrap_or(0);
                if offset >= len {
                    buf.fill(0);
                    return;
                }
                file.seek(SeekFrom::Start(offset)).expect("seek");
                let readable = ((len - offset) as usize).min(buf.len());
                file.read_exact(&mut buf[..readable]).expect("short read on base file");
                buf[readable..].fill(0);
            }
            None => buf.fill(0),
        }
    }

    fn write(&mut self, lba: u64, buf: &[u8]) {
        assert_eq!(buf.len(), self.lba_size as usize);
        self.overlay.insert(lba, buf.to_vec());
    }

    fn erase(&mut self, lba: u64, count: u64) {
        for i in 0..count {
            self.overlay.insert(lba + i, vec![0u8; self.lba_size as usize]);
        }
    }
}
