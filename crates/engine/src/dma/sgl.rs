//! SGL descriptor resolution (`spec.md` §4.6), grounded on
//! `original_source/hil/nvme/dma.hh`'s `SGL::parseSGLDescriptor` /
//! `parseSGLSegment` two-level walk (a descriptor is either data or a
//! pointer to a further segment of 16-byte descriptors).

use super::{DmaError, HostMemory, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SglKind {
    DataBlock,
    BitBucket,
    Segment,
    LastSegment,
    KeyedDataBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SglDescriptor {
    pub address: u64,
    pub length: u32,
    pub kind: SglKind,
}

pub struct SglEngine<'m> {
    mem: &'m dyn HostMemory,
}

impl<'m> SglEngine<'m> {
    pub fn new(mem: &'m dyn HostMemory) -> Self {
        Self { mem }
    }

    /// The 16-byte SGL descriptor at `addr`: a 64-bit address, a 32-bit
    /// length, 3 reserved bytes, then a type/subtype id byte.
    fn read_descriptor(&self, addr: u64) -> Result<SglDescriptor, DmaError> {
        let address = self.mem.read_u64(addr);
        let length = self.mem.read_u32(addr + 8);
        let id = self.mem.read_u8(addr + 15);
        let kind = match id >> 4 {
            0x0 => SglKind::DataBlock,
            0x1 => SglKind::BitBucket,
            0x2 => SglKind::Segment,
            0x3 => SglKind::LastSegment,
            0x4 => SglKind::KeyedDataBlock,
            _ => return Err(DmaError::InvalidDescriptor),
        };
        Ok(SglDescriptor { address, length, kind })
    }

    fn walk_segment(&self, addr: u64, byte_len: u64, is_last: bool, out: &mut Vec<Segment>) -> Result<(), DmaError> {
        let count = (byte_len / 16) as usize;
        for i in 0..count {
            let desc = self.read_descriptor(addr + (i as u64) * 16)?;
            match desc.kind {
                SglKind::DataBlock | SglKind::KeyedDataBlock => {
                    out.push(Segment { host_addr: desc.address, len: desc.length as u64, ignore: false })
                }
                SglKind::BitBucket => {
                    out.push(Segment { host_addr: desc.address, len: desc.length as u64, ignore: true })
                }
                SglKind::Segment => {
                    if is_last {
                        return Err(DmaError::InvalidDescriptor);
                    }
                    self.walk_segment(desc.address, desc.length as u64, false, out)?;
                }
                SglKind::LastSegment => {
                    self.walk_segment(desc.address, desc.length as u64, true, out)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a command's first SGL descriptor into a flat segment list,
    /// following Segment/Last-Segment chains as needed.
    pub fn resolve(&self, first: SglDescriptor, expected_size: u64) -> Result<Vec<Segment>, DmaError> {
        let mut segments = Vec::new();
        match first.kind {
            SglKind::DataBlock | SglKind::KeyedDataBlock => {
                segments.push(Segment { host_addr: first.address, len: first.length as u64, ignore: false })
            }
            SglKind::BitBucket => {
                segments.push(Segment { host_addr: first.address, len: first.length as u64, ignore: true })
            }
            SglKind::Segment => self.walk_segment(first.address, first.length as u64, false, &mut segments)?,
            SglKind::LastSegment => self.walk_segment(first.address, first.length as u64, true, &mut segments)?,
        }

        let total: u64 = segments.iter().map(|s| s.len).sum();
        if total != expected_size {
            return Err(DmaError::ExhaustedChain);
        }
        Ok(segments)
    }
}
