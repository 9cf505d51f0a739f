//! Loads a device/workload JSON file into the typed settings
//! [`main`](crate) needs to build an `ssdsim_engine::nvme::Controller`,
//! the same "opaque getters over one JSON document" shape
//! `ssdsim_engine::config::Config` exposes.

use anyhow::{Context, Result};
use ssdsim_engine::config::Config;
use ssdsim_engine::nand_latency::NandType;

pub struct DeviceSettings {
    pub channels: u32,
    pub packages: u32,
    pub dies: u32,
    pub planes: u32,
    pub blocks: u32,
    pub pages: u32,
    pub page_size: u64,
    pub nand_type: NandType,
    pub dma_mhz: u32,
    pub cache_size: usize,
    pub cache_ways: usize,
    pub line_size: usize,
    pub free_ratio_threshold: f64,
}

fn parse_nand_type(raw: &str) -> Result<NandType> {
    match raw.to_ascii_uppercase().as_str() {
        "SLC" => Ok(NandType::Slc),
        "MLC" => Ok(NandType::Mlc),
        "TLC" => Ok(NandType::Tlc),
        other => anyhow::bail!("unsupported NAND type in config: {other}"),
    }
}

impl DeviceSettings {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = Config::from_file(path).with_context(|| format!("loading device config from {path}"))?;
        Self::from_config(&cfg)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            channels: cfg.get_u32_or("pal.channels", 4),
            packages: cfg.get_u32_or("pal.packages", 1),
            dies: cfg.get_u32_or("pal.dies", 2),
            planes: cfg.get_u32_or("pal.planes", 1),
            blocks: cfg.get_u32_or("ftl.blocks_per_die", 256),
            pages: cfg.get_u32_or("ftl.pages_per_block", 256),
            page_size: cfg.get_u64_or("nand.page_size", 4096),
            nand_type: parse_nand_type(&cfg.get_str_or("nand.type", "TLC"))?,
            dma_mhz: cfg.get_u32_or("pal.dma_mhz", 400),
            cache_size: cfg.get_u64_or("icl.cache_size", 64 * 1024) as usize,
            cache_ways: cfg.get_u64_or("icl.ways", 4) as usize,
            line_size: cfg.get_u64_or("icl.line_size", 4096) as usize,
            free_ratio_threshold: cfg.get_f64("ftl.free_ratio_threshold").unwrap_or(0.15),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_an_empty_document() {
        let cfg = Config::empty();
        let settings = DeviceSettings::from_config(&cfg).unwrap();
        assert_eq!(settings.channels, 4);
        assert!(matches!(settings.nand_type, NandType::Tlc));
    }

    #[test]
    fn unknown_nand_type_is_rejected() {
        let cfg = Config::from_str(r#"{"nand": {"type": "QLC2"}}"#).unwrap();
        assert!(DeviceSettings::from_config(&cfg).is_err());
    }
}
