//! Process resource sampling
//!
//! Sampling is best effort: a sampler that cannot read process statistics
//! returns `None` and the collector simply records no point.

use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Resource usage of the current process at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessSample {
    pub memory_mb: f64,
    /// Share of total machine CPU since the previous sample; absent on the
    /// first sample
    pub cpu_percent: Option<f64>,
    pub threads: Option<u64>,
}

/// Source of process resource samples
pub trait ProcessSampler: Send + Sync + std::fmt::Debug {
    fn sample(&self) -> Option<ProcessSample>;
}

/// Sampler backed by `/proc/self` on Linux
///
/// CPU usage is derived from the change in user+system clock ticks between
/// consecutive samples, normalized by the number of logical CPUs.
#[derive(Debug)]
pub struct ProcSelfSampler {
    previous: Mutex<Option<(u64, Instant)>>,
}

/// Kernel USER_HZ; 100 on every mainstream Linux configuration
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

impl ProcSelfSampler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            previous: Mutex::new(None),
        }
    }

    fn read_status() -> Option<(f64, Option<u64>)> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let mut rss_kb = None;
        let mut threads = None;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                rss_kb = rest.split_whitespace().next()?.parse::<f64>().ok();
            } else if let Some(rest) = line.strip_prefix("Threads:") {
                threads = rest.trim().parse::<u64>().ok();
            }
        }
        Some((rss_kb? / 1024.0, threads))
    }

    /// utime + stime in clock ticks
    fn read_cpu_ticks() -> Option<u64> {
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        // The command name may contain spaces; fields resume after the last ')'
        let after_comm = &stat[stat.rfind(')')? + 1..];
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        // utime and stime are fields 14 and 15 of the full line
        let utime = fields.get(11)?.parse::<u64>().ok()?;
        let stime = fields.get(12)?.parse::<u64>().ok()?;
        Some(utime + stime)
    }
}

impl Default for ProcSelfSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for ProcSelfSampler {
    fn sample(&self) -> Option<ProcessSample> {
        let (memory_mb, threads) = Self::read_status()?;
        let now = Instant::now();

        let cpu_percent = Self::read_cpu_ticks().and_then(|ticks| {
            let mut previous = self.previous.lock();
            let percent = previous.and_then(|(last_ticks, last_at)| {
                let wall = now.duration_since(last_at).as_secs_f64();
                if wall <= 0.0 {
                    return None;
                }
                let cpu_seconds = ticks.saturating_sub(last_ticks) as f64 / CLOCK_TICKS_PER_SECOND;
                let cpus = num_cpus::get().max(1) as f64;
                Some((cpu_seconds / wall / cpus * 100.0).clamp(0.0, 100.0))
            });
            *previous = Some((ticks, now));
            percent
        });

        Some(ProcessSample {
            memory_mb,
            cpu_percent,
            threads,
        })
    }
}

/// Sampler that never produces data, for platforms without `/proc`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSampler;

impl ProcessSampler for NoOpSampler {
    #[inline(always)]
    fn sample(&self) -> Option<ProcessSample> {
        None
    }
}

/// Platform default sampler
#[must_use]
pub fn default_sampler() -> std::sync::Arc<dyn ProcessSampler> {
    if cfg!(target_os = "linux") {
        std::sync::Arc::new(ProcSelfSampler::new())
    } else {
        std::sync::Arc::new(NoOpSampler)
    }
}
