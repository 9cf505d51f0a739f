//! Pure link-delay functions (`spec.md` §2 row 2, "DelayModel").
//!
//! Every function here is a pure `(parameters) -> picoseconds` computation
//! with no side effects and no access to simulation time — callers are
//! responsible for turning the returned delay into a scheduled event.

const PS_PER_SEC: f64 = 1e12;

/// PCI Express generation, selecting the per-lane line rate and line
/// encoding efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcieGen {
    Gen1,
    Gen2,
    Gen3,
    Gen4,
    Gen5,
}

impl PcieGen {
    /// Raw line rate in gigatransfers/second.
    fn gt_per_sec(self) -> f64 {
        match self {
            PcieGen::Gen1 => 2.5,
            PcieGen::Gen2 => 5.0,
            PcieGen::Gen3 => 8.0,
            PcieGen::Gen4 => 16.0,
            PcieGen::Gen5 => 32.0,
        }
    }

    /// Line-encoding efficiency: 8b/10b for Gen1/2, 128b/130b from Gen3 on.
    fn encoding_efficiency(self) -> f64 {
        match self {
            PcieGen::Gen1 | PcieGen::Gen2 => 8.0 / 10.0,
            PcieGen::Gen3 | PcieGen::Gen4 | PcieGen::Gen5 => 128.0 / 130.0,
        }
    }
}

/// Picoseconds to move `bytes` over a PCIe link of the given generation
/// and lane width.
pub fn pcie(gen: PcieGen, lanes: u32, bytes: u64) -> u64 {
    assert!(lanes > 0, "lane count must be positive");
    let bytes_per_sec_per_lane = gen.gt_per_sec() * 1e9 * gen.encoding_efficiency() / 8.0;
    let bytes_per_sec = bytes_per_sec_per_lane * lanes as f64;
    ps_for_bytes(bytes, bytes_per_sec)
}

/// SATA generation, selecting line rate (single differential pair, 8b/10b
/// encoded at every generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SataGen {
    Gen1,
    Gen2,
    Gen3,
}

impl SataGen {
    fn gbps(self) -> f64 {
        match self {
            SataGen::Gen1 => 1.5,
            SataGen::Gen2 => 3.0,
            SataGen::Gen3 => 6.0,
        }
    }
}

pub fn sata(gen: SataGen, bytes: u64) -> u64 {
    let bytes_per_sec = gen.gbps() * 1e9 * (8.0 / 10.0) / 8.0;
    ps_for_bytes(bytes, bytes_per_sec)
}

/// M-PHY HS-GEAR used by UFS, one lane's raw rate before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MphyMode {
    HsGear1,
    HsGear2,
    HsGear3,
    HsGear4,
}

impl MphyMode {
    fn gbps(self) -> f64 {
        match self {
            MphyMode::HsGear1 => 1.248,
            MphyMode::HsGear2 => 2.496,
            MphyMode::HsGear3 => 4.992,
            MphyMode::HsGear4 => 9.984,
        }
    }

    /// HS-GEAR1..3 use 8b/10b; HS-GEAR4 moved to 128b/132b.
    fn encoding_efficiency(self) -> f64 {
        match self {
            MphyMode::HsGear1 | MphyMode::HsGear2 | MphyMode::HsGear3 => 8.0 / 10.0,
            MphyMode::HsGear4 => 128.0 / 132.0,
        }
    }
}

/// Picoseconds to move `symbols` (bytes, post line-encoding accounting is
/// already folded into the per-mode efficiency) over `lanes` M-PHY lanes.
pub fn mphy(mode: MphyMode, lanes: u32, symbols: u64) -> u64 {
    assert!(lanes > 0, "lane count must be positive");
    let bytes_per_sec_per_lane = mode.gbps() * 1e9 * mode.encoding_efficiency() / 8.0;
    let bytes_per_sec = bytes_per_sec_per_lane * lanes as f64;
    ps_for_bytes(symbols, bytes_per_sec)
}

/// Picoseconds to move `bytes` over a synchronous AXI bus of the given
/// clock frequency (MHz) and data width (bits), one beat per clock.
pub fn axi(clk_mhz: u32, width_bits: u32, bytes: u64) -> u64 {
    assert!(clk_mhz > 0 && width_bits > 0, "clk/width must be positive");
    let bytes_per_beat = width_bits as f64 / 8.0;
    let beats = (bytes as f64 / bytes_per_beat).ceil();
    let clk_hz = clk_mhz as f64 * 1e6;
    (beats / clk_hz * PS_PER_SEC).round() as u64
}

fn ps_for_bytes(bytes: u64, bytes_per_sec: f64) -> u64 {
    if bytes == 0 {
        return 0;
    }
    (bytes as f64 / bytes_per_sec * PS_PER_SEC).round() as u64
}
