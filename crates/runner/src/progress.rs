//! Periodic progress logging during a run, gated behind `spec.md` §6's
//! `--progress` flag and always written to stderr with a bare `eprintln!`
//! — unlike the rest of the runner's diagnostics, this is meant to be
//! redirect-safe against a piped stdout report, the same separation the
//! teacher's benchmark loops draw between progress chatter and results.

pub struct ProgressReporter {
    label: &'static str,
    enabled: bool,
    total_ticks: u64,
    log_every: u64,
}

impl ProgressReporter {
    pub fn new(label: &'static str, enabled: bool, total_ticks: u64) -> Self {
        let log_every = (total_ticks / 10).max(1);
        Self { label, enabled, total_ticks, log_every }
    }

    pub fn tick(&self, now: u64, completions_so_far: usize) {
        if !self.enabled {
            return;
        }
        if now % self.log_every == 0 || now + 1 >= self.total_ticks {
            eprintln!(
                "{}: tick {}/{} ({} completions so far)",
                self.label, now, self.total_ticks, completions_so_far
            );
        }
    }

    pub fn finish(&self, completions: usize) {
        if !self.enabled {
            return;
        }
        eprintln!("{}: done, {} total completions", self.label, completions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_every_is_never_zero_even_for_short_runs() {
        let reporter = ProgressReporter::new("test", true, 3);
        assert!(reporter.log_every >= 1);
    }

    #[test]
    fn log_every_is_never_zero_for_a_single_tick_run() {
        let reporter = ProgressReporter::new("test", true, 1);
        assert_eq!(reporter.log_every, 1);
    }

    #[test]
    fn disabled_reporter_is_silent() {
        // Nothing to assert on stderr output directly; this just exercises
        // the disabled path for a panic/crash regression.
        let reporter = ProgressReporter::new("test", false, 100);
        reporter.tick(0, 0);
        reporter.finish(0);
    }
}
