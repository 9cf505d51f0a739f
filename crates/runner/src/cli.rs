//! Argument parsing for the `ssdsim` binary (`spec.md` §6's "CLI surface":
//! a simulation config path, an output prefix, a tick-based simulation
//! duration, and a `--progress` flag). Hand-rolled `std::env::args()`
//! scanning, the same style `config_loader` and the rest of this crate
//! use rather than pulling in a dedicated argument-parsing crate the
//! teacher's own CLI surface never needed either.

pub struct Args {
    pub config_path: Option<String>,
    pub out_prefix: String,
    pub duration_ticks: u64,
    pub io_depth: u16,
    pub progress: bool,
}

const DEFAULT_OUT_PREFIX: &str = "ssdsim-run";
const DEFAULT_DURATION_TICKS: u64 = 10_000_000;
const DEFAULT_IO_DEPTH: u16 = 8;

impl Args {
    pub fn parse() -> Self {
        Self::from_raw(std::env::args().collect())
    }

    fn from_raw(raw: Vec<String>) -> Self {
        let config_path = flag_value(&raw, "--config");
        let out_prefix = flag_value(&raw, "--out").unwrap_or_else(|| DEFAULT_OUT_PREFIX.to_string());
        let duration_ticks = flag_value(&raw, "--duration")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DURATION_TICKS);
        let io_depth = flag_value(&raw, "--io-depth")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_IO_DEPTH);
        let progress = raw.iter().any(|a| a == "--progress");
        Args { config_path, out_prefix, duration_ticks, io_depth, progress }
    }
}

fn flag_value(raw: &[String], flag: &str) -> Option<String> {
    raw.iter().position(|a| a == flag).and_then(|i| raw.get(i + 1)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        let raw: Vec<String> = std::iter::once("ssdsim".to_string()).chain(argv.iter().map(|s| s.to_string())).collect();
        Args::from_raw(raw)
    }

    #[test]
    fn defaults_apply_with_no_flags() {
        let a = args(&[]);
        assert!(a.config_path.is_none());
        assert_eq!(a.out_prefix, DEFAULT_OUT_PREFIX);
        assert_eq!(a.duration_ticks, DEFAULT_DURATION_TICKS);
        assert_eq!(a.io_depth, DEFAULT_IO_DEPTH);
        assert!(!a.progress);
    }

    #[test]
    fn parses_every_flag() {
        let a = args(&["--config", "dev.toml", "--out", "run1", "--duration", "500", "--io-depth", "4", "--progress"]);
        assert_eq!(a.config_path.as_deref(), Some("dev.toml"));
        assert_eq!(a.out_prefix, "run1");
        assert_eq!(a.duration_ticks, 500);
        assert_eq!(a.io_depth, 4);
        assert!(a.progress);
    }
}
