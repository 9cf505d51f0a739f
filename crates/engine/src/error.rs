//! Error taxonomy for the simulator core.
//!
//! Per spec.md §7: configuration and programmer errors are fatal (they
//! panic rather than return a `Result`, so misuse fails loud in CI);
//! protocol, resource and media errors are surfaced to the host as an
//! [`crate::nvme::status::NvmeStatus`] and never unwind the process.

use thiserror::Error;

/// Fatal configuration problems, detected at device init.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("page size {0} is not a power of two")]
    PageSizeNotPowerOfTwo(u64),
    #[error("NAND page size {0} exceeds the 16 KiB limit")]
    PageTooLarge(u64),
    #[error("DMA speed {0} MHz is not divisible by 50 MHz")]
    DmaSpeedNotDivisible(u32),
    #[error("unsupported NAND type: {0}")]
    UnsupportedNandType(String),
    #[error("missing required config key: {0}")]
    MissingKey(&'static str),
    #[error("config value for {key} could not be parsed as {expected}: {value}")]
    BadValue {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Errors raised by the [`crate::pal`] timeline scheduler.
#[derive(Debug, Error)]
pub enum PalError {
    #[error("channel index {0} out of range")]
    BadChannel(u32),
    #[error("die index {0} out of range")]
    BadDie(u32),
    #[error(
        "PAL insertion overlap on resource {resource}: new [{new_start}, {new_end}] \
         overlaps existing [{existing_start}, {existing_end}]"
    )]
    Overlap {
        resource: &'static str,
        new_start: u64,
        new_end: u64,
        existing_start: u64,
        existing_end: u64,
    },
}

/// Errors raised by the [`crate::ftl`] page mapper.
#[derive(Debug, Error)]
pub enum FtlError {
    #[error("device is out of free blocks")]
    OutOfCapacity,
    #[error("lpn {0:?} is not mapped")]
    Unmapped(crate::addr::Lpn),
    #[error("operation on invalid lpn/ppn handle")]
    InvalidHandle,
}

/// Errors raised by the [`crate::icl`] cache.
#[derive(Debug, Error)]
pub enum IclError {
    #[error("cache geometry is invalid: sets={sets} ways={ways} line_size={line_size}")]
    BadGeometry {
        sets: usize,
        ways: usize,
        line_size: usize,
    },
}

/// A programmer error: arithmetic on an invalid handle, double-scheduling,
/// or an invariant violation that should never happen from valid input.
/// `spec.md` §7 requires these to abort the process; callers obtain one of
/// these only to format a diagnostic before calling `panic!`.
#[derive(Debug, Error)]
pub enum ProgrammerError {
    #[error("{0}")]
    Invariant(String),
}

impl ProgrammerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        ProgrammerError::Invariant(msg.into())
    }
}
