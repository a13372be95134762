use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::times::CpuTimes;

use super::CpuSnapshotSource;

const TOTAL_LABEL: &str = "cpu-total";

/// Reads host CPU times from `/proc/stat`.
///
/// Counters are USER_HZ ticks and are converted to seconds with `clock_ticks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    path: PathBuf,
    clock_ticks: u64,
}

impl ProcStat {
    pub fn new(path: impl Into<PathBuf>, clock_ticks: u64) -> Self {
        Self {
            path: path.into(),
            clock_ticks: clock_ticks.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.proc_stat, config.clock_ticks)
    }

    /// Parses the content of `/proc/stat`.
    ///
    /// Lines other than `cpu` and `cpuN` are ignored. A `cpu` line with non-numeric fields or
    /// fewer than the four fields every kernel reports (`user nice system idle`) is skipped.
    /// Fields missing on older kernels are `0.0`.
    pub fn parse(&self, contents: &str, per_cpu: bool) -> Vec<CpuTimes> {
        contents
            .lines()
            .filter_map(|line| self.parse_line(line))
            .filter(|(is_total, _)| *is_total != per_cpu)
            .map(|(_, times)| times)
            .collect()
    }

    fn parse_line(&self, line: &str) -> Option<(bool, CpuTimes)> {
        let mut fields = line.split_whitespace();
        let label = fields.next()?;
        let index = label.strip_prefix("cpu")?;
        let is_total = index.is_empty();
        if !is_total && index.parse::<u32>().is_err() {
            return None;
        }

        let values = fields
            .map(|field| field.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()?;
        if values.len() < 4 {
            log::trace!("skipping short cpu line `{line}`");
            return None;
        }

        let seconds = |idx: usize| {
            values
                .get(idx)
                .map_or(0.0, |ticks| *ticks as f64 / self.clock_ticks as f64)
        };
        let times = CpuTimes {
            cpu: if is_total {
                TOTAL_LABEL.to_owned()
            } else {
                label.to_owned()
            },
            user: seconds(0),
            nice: seconds(1),
            system: seconds(2),
            idle: seconds(3),
            iowait: seconds(4),
            irq: seconds(5),
            softirq: seconds(6),
            steal: seconds(7),
            guest: seconds(8),
            guest_nice: seconds(9),
        };
        Some((is_total, times))
    }
}

impl CpuSnapshotSource for ProcStat {
    fn cpu_times(&self, per_cpu: bool) -> Result<Vec<CpuTimes>> {
        let contents =
            fsutil::read_snapshot(&self.path).map_err(|err| Error::HostCpuUnavailable {
                path: err.path,
                source: err.source,
            })?;
        Ok(self.parse(&contents, per_cpu))
    }
}
