//! Sequential-access prefetch trigger (`spec.md` §4.5).

use crate::addr::Lpn;

#[derive(Debug, Clone, Copy)]
pub struct PrefetchConfig {
    pub enabled: bool,
    /// Minimum run of sequential accesses before prefetch fires.
    pub sequential_threshold: u32,
    /// Minimum fraction of the run's span actually touched before
    /// prefetch fires (guards against sparse "sequential-looking" access).
    pub coverage_ratio: f64,
    pub prefetch_pages: u32,
}

pub struct PrefetchTrigger {
    cfg: PrefetchConfig,
    last_lpn: Option<Lpn>,
    sequential_count: u32,
    bytes_touched: u64,
    run_span_pages: u64,
}

impl PrefetchTrigger {
    pub fn new(cfg: PrefetchConfig) -> Self {
        Self {
            cfg,
            last_lpn: None,
            sequential_count: 0,
            bytes_touched: 0,
            run_span_pages: 0,
        }
    }

    /// Record an access to `lpn`; returns the LPNs to prefetch, if any,
    /// given the run just became long and dense enough.
    pub fn on_access(&mut self, lpn: Lpn) -> Vec<Lpn> {
        if !self.cfg.enabled {
            return Vec::new();
        }

        let is_sequential = self.last_lpn == Some(Lpn(lpn.get().saturating_sub(1)));
        if is_sequential {
            self.sequential_count += 1;
            self.run_span_pages += 1;
        } else {
            self.sequential_count = 1;
            self.run_span_pages = 1;
            self.bytes_touched = 0;
        }
        self.bytes_touched += 1;
        self.last_lpn = Some(lpn);

        let coverage = self.bytes_touched as f64 / self.run_span_pages.max(1) as f64;
        if self.sequential_count >= self.cfg.sequential_threshold && coverage >= self.cfg.coverage_ratio {
            self.sequential_count = 0; // one prefetch burst per qualifying run
            (1..=self.cfg.prefetch_pages as u64)
                .map(|d| Lpn(lpn.get() + d))
                .collect()
        } else {
            Vec::new()
        }
    }
}
