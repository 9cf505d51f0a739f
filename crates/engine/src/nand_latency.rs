//! Per-NAND-type lookup of `(page-type, operation, busy-phase) -> ps`
//! (`spec.md` §2 row 5, §4.3).
//!
//! `DMA0`/`DMA1` figures scale with the configured bus speed and page
//! size (smaller pages, faster buses move the same electrons faster);
//! `MEM` (the die-internal operation itself — program/read/erase time) is
//! a fixed per-page-type/operation constant, the way a real NAND
//! datasheet's tPROG/tR/tBERS are independent of the host bus.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NandType {
    Slc,
    Mlc,
    Tlc,
}

/// Which page within a multi-bit-per-cell wordline this PPN's page
/// number lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Single-level-cell page (also used for the base page of any type).
    Single,
    Lsb,
    Csb,
    Msb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyPhase {
    Dma0,
    Mem,
    Dma1,
}

const REFERENCE_PAGE_SIZE: u64 = 16384;
const REFERENCE_MHZ: u32 = 50;

fn spdiv(mhz: u32) -> Result<u32, ConfigError> {
    match mhz {
        50 => Ok(1),
        100 => Ok(2),
        200 => Ok(4),
        400 => Ok(8),
        800 => Ok(16),
        1600 => Ok(32),
        other => {
            if other % REFERENCE_MHZ != 0 {
                Err(ConfigError::DmaSpeedNotDivisible(other))
            } else {
                Ok(other / REFERENCE_MHZ)
            }
        }
    }
}

fn pgdiv(page_size: u64) -> Result<u64, ConfigError> {
    if page_size > REFERENCE_PAGE_SIZE {
        return Err(ConfigError::PageTooLarge(page_size));
    }
    if !page_size.is_power_of_two() {
        return Err(ConfigError::PageSizeNotPowerOfTwo(page_size));
    }
    Ok(REFERENCE_PAGE_SIZE / page_size)
}

/// `MEM`-phase latency in picoseconds at the reference 16 KiB page, for
/// every `(NandType, PageType, Operation)` combination. Values follow the
/// well-known ordering SLC < MLC-LSB < MLC-MSB < TLC-LSB < TLC-CSB <
/// TLC-MSB for program time, and erase dominating every other operation.
fn base_mem_ps(nand: NandType, page: PageType, op: Operation) -> u64 {
    match (nand, page, op) {
        (NandType::Slc, _, Operation::Read) => 25_000_000,
        (NandType::Slc, _, Operation::Write) => 200_000_000,
        (NandType::Slc, _, Operation::Erase) => 1_500_000_000,

        (NandType::Mlc, PageType::Lsb, Operation::Read) => 50_000_000,
        (NandType::Mlc, PageType::Msb, Operation::Read) => 75_000_000,
        (NandType::Mlc, PageType::Lsb, Operation::Write) => 400_000_000,
        (NandType::Mlc, PageType::Msb, Operation::Write) => 1_800_000_000,
        (NandType::Mlc, _, Operation::Erase) => 3_500_000_000,

        (NandType::Tlc, PageType::Lsb, Operation::Read) => 75_000_000,
        (NandType::Tlc, PageType::Csb, Operation::Read) => 90_000_000,
        (NandType::Tlc, PageType::Msb, Operation::Read) => 110_000_000,
        (NandType::Tlc, PageType::Lsb, Operation::Write) => 600_000_000,
        (NandType::Tlc, PageType::Csb, Operation::Write) => 1_400_000_000,
        (NandType::Tlc, PageType::Msb, Operation::Write) => 2_800_000_000,
        (NandType::Tlc, _, Operation::Erase) => 5_000_000_000,

        // PageType::Single only occurs for SLC, handled above; any other
        // combination reaching here is a configuration mismatch.
        (nand, page, op) => panic!("no latency entry for {:?}/{:?}/{:?}", nand, page, op),
    }
}

/// `DMA0`/`DMA1` base transfer latency at the reference page size/speed:
/// command+address (`Dma0`) is a small fixed overhead, data transfer
/// (`Dma1`) scales with page size handled by the caller via `pgdiv`.
fn base_dma_ps(phase: BusyPhase, page_size: u64) -> u64 {
    match phase {
        BusyPhase::Dma0 => 1_000_000, // fixed command/address cycle overhead
        BusyPhase::Dma1 => {
            // 1 ns per 4 bytes at the reference bus width, scaled by page size.
            (page_size * 1_000) / 4
        }
        BusyPhase::Mem => unreachable!("Mem phase has no DMA base latency"),
    }
}

/// Configured latency model for one NAND type, bus speed and page size.
#[derive(Debug, Clone)]
pub struct NandLatencyModel {
    nand_type: NandType,
    page_size: u64,
    spdiv: u32,
    pgdiv: u64,
}

impl NandLatencyModel {
    pub fn new(nand_type: NandType, mhz: u32, page_size: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            nand_type,
            page_size,
            spdiv: spdiv(mhz)?,
            pgdiv: pgdiv(page_size)?,
        })
    }

    pub fn nand_type(&self) -> NandType {
        self.nand_type
    }

    /// Which `PageType` a raw page-within-wordline index (0-based) maps
    /// to, given the configured NAND type's bits-per-cell.
    pub fn page_type_of(&self, page_index_in_wordline: u32) -> PageType {
        match self.nand_type {
            NandType::Slc => PageType::Single,
            NandType::Mlc => {
                if page_index_in_wordline % 2 == 0 {
                    PageType::Lsb
                } else {
                    PageType::Msb
                }
            }
            NandType::Tlc => match page_index_in_wordline % 3 {
                0 => PageType::Lsb,
                1 => PageType::Csb,
                _ => PageType::Msb,
            },
        }
    }

    pub fn latency(&self, page: PageType, op: Operation, phase: BusyPhase) -> u64 {
        match phase {
            BusyPhase::Mem => base_mem_ps(self.nand_type, page, op),
            BusyPhase::Dma0 | BusyPhase::Dma1 => {
                base_dma_ps(phase, self.page_size) / (self.pgdiv * self.spdiv as u64).max(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_page() {
        assert!(matches!(
            NandLatencyModel::new(NandType::Tlc, 400, 32768),
            Err(ConfigError::PageTooLarge(32768))
        ));
    }

    #[test]
    fn rejects_bad_dma_speed() {
        assert!(matches!(
            NandLatencyModel::new(NandType::Tlc, 333, 16384),
            Err(ConfigError::DmaSpeedNotDivisible(333))
        ));
    }

    #[test]
    fn faster_bus_shrinks_dma_latency() {
        let slow = NandLatencyModel::new(NandType::Mlc, 50, 16384).unwrap();
        let fast = NandLatencyModel::new(NandType::Mlc, 400, 16384).unwrap();
        let slow_dma1 = slow.latency(PageType::Lsb, Operation::Read, BusyPhase::Dma1);
        let fast_dma1 = fast.latency(PageType::Lsb, Operation::Read, BusyPhase::Dma1);
        assert!(fast_dma1 < slow_dma1);
    }

    #[test]
    fn mlc_msb_program_slower_than_lsb() {
        let model = NandLatencyModel::new(NandType::Mlc, 100, 8192).unwrap();
        let lsb = model.latency(PageType::Lsb, Operation::Write, BusyPhase::Mem);
        let msb = model.latency(PageType::Msb, Operation::Write, BusyPhase::Mem);
        assert!(msb > lsb);
    }

    #[test]
    fn page_type_of_cycles_tlc() {
        let model = NandLatencyModel::new(NandType::Tlc, 100, 8192).unwrap();
        assert_eq!(model.page_type_of(0), PageType::Lsb);
        assert_eq!(model.page_type_of(1), PageType::Csb);
        assert_eq!(model.page_type_of(2), PageType::Msb);
        assert_eq!(model.page_type_of(3), PageType::Lsb);
    }
}
