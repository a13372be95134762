//! CPU accounting of a container.
//!
//! The kernel reports CPU time in different units depending on the hierarchy version:
//!
//! | version | file            | fields                                      | unit          |
//! |---------|-----------------|---------------------------------------------|---------------|
//! | v1      | `cpuacct.stat`  | `user`, `system`                            | USER_HZ ticks |
//! | v1      | `cpuacct.usage` | single value                                | nanoseconds   |
//! | v2      | `cpu.stat`      | `user_usec`, `system_usec`, `usage_usec`    | microseconds  |
//!
//! [`CgroupDockerStat`] keeps the raw values, [`CgroupCpuDockerStat`] exposes seconds.
//!
//! # Example
//!
//! ```rust
//! use cgstat::cgroup::{CgroupVersion, RawCounters};
//! use cgstat::cgroup::stats::normalize_cpu;
//! use cgstat::container::ContainerID;
//!
//! let id = ContainerID::new("abc123").unwrap();
//! let counters = RawCounters::from([("user", 100), ("system", 50)]);
//! let stat = normalize_cpu(&id, CgroupVersion::V1, &counters, 100).unwrap();
//!
//! assert_eq!(stat.times.user, 1.0);
//! assert_eq!(stat.times.system, 0.5);
//! assert_eq!(stat.usage, 1.5);
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::cgroup::{CgroupVersion, Domain, RawCounters};
use crate::container::ContainerID;
use crate::error::Result;
use crate::times::CpuTimes;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;
const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Unit of a raw CPU counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterUnit {
    /// Kernel clock ticks (USER_HZ).
    Ticks,
    Nanoseconds,
    Microseconds,
}

impl CounterUnit {
    /// Converts a raw counter to seconds. `clock_ticks` is only used for [`CounterUnit::Ticks`].
    pub fn to_seconds(self, raw: u64, clock_ticks: u64) -> f64 {
        match self {
            CounterUnit::Ticks => raw as f64 / clock_ticks.max(1) as f64,
            CounterUnit::Nanoseconds => raw as f64 / NANOS_PER_SEC,
            CounterUnit::Microseconds => raw as f64 / MICROS_PER_SEC,
        }
    }
}

/// Raw CPU counters of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CgroupDockerStat {
    pub container_id: ContainerID,
    pub version: CgroupVersion,
    /// Time spent in user space, in `times_unit`.
    pub user: u64,
    /// Time spent in kernel space, in `times_unit`.
    pub system: u64,
    /// Total CPU time in `usage_unit`, if the kernel exposes it separately.
    pub usage: Option<u64>,
    pub times_unit: CounterUnit,
    pub usage_unit: CounterUnit,
}

impl CgroupDockerStat {
    /// Extracts the CPU counters of `version` from `counters`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteAccountingData`](crate::Error::IncompleteAccountingData) if
    /// user or system time is missing.
    pub fn from_counters(
        container_id: ContainerID,
        version: CgroupVersion,
        counters: &RawCounters,
    ) -> Result<Self> {
        let keys = version.cpu_keys();
        let user = super::require(counters, keys.user, &container_id, Domain::Cpu)?;
        let system = super::require(counters, keys.system, &container_id, Domain::Cpu)?;
        Ok(Self {
            usage: counters.get(keys.usage),
            container_id,
            version,
            user,
            system,
            times_unit: keys.times_unit,
            usage_unit: keys.usage_unit,
        })
    }

    /// Converts the raw counters to seconds.
    ///
    /// Without a separate usage counter, usage is user plus system time.
    pub fn normalize(&self, clock_ticks: u64) -> CgroupCpuDockerStat {
        let times = CpuTimes {
            user: self.times_unit.to_seconds(self.user, clock_ticks),
            system: self.times_unit.to_seconds(self.system, clock_ticks),
            ..CpuTimes::labelled(self.container_id.as_ref())
        };
        let usage = match self.usage {
            Some(usage) => self.usage_unit.to_seconds(usage, clock_ticks),
            None => times.user + times.system,
        };
        CgroupCpuDockerStat {
            summary: summarize(&times, usage),
            container_id: self.container_id.clone(),
            times,
            usage,
        }
    }
}

/// CPU statistic of one container, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CgroupCpuDockerStat {
    pub container_id: ContainerID,
    /// Cumulative CPU times, labelled with the container id. Containers have no idle time.
    pub times: CpuTimes,
    /// Cumulative CPU usage in seconds.
    pub usage: f64,
    /// Human readable summary of user and system shares and total usage. Never empty.
    pub summary: String,
}

impl CgroupCpuDockerStat {
    /// CPU utilisation in percent of one core between `previous` and `self`.
    ///
    /// Returns `None` if `elapsed` is zero, the samples belong to different containers, or usage
    /// went backwards (e.g. the container was recreated under the same id).
    pub fn cpu_percent(&self, previous: &Self, elapsed: Duration) -> Option<f64> {
        if elapsed.is_zero() || self.container_id != previous.container_id {
            return None;
        }
        let delta = self.usage - previous.usage;
        if delta < 0.0 {
            return None;
        }
        Some(delta / elapsed.as_secs_f64() * 100.0)
    }
}

fn summarize(times: &CpuTimes, usage: f64) -> String {
    let busy = times.user + times.system;
    let (user_share, system_share) = if busy > 0.0 {
        (times.user / busy * 100.0, times.system / busy * 100.0)
    } else {
        (0.0, 0.0)
    };
    format!(
        "user={:.2}s ({user_share:.1}%) system={:.2}s ({system_share:.1}%) total={usage:.2}s",
        times.user, times.system
    )
}

/// Normalizes the CPU counters of one container.
///
/// # Errors
///
/// Returns [`Error::IncompleteAccountingData`](crate::Error::IncompleteAccountingData) if
/// required counters are missing.
pub fn normalize_cpu(
    id: &ContainerID,
    version: CgroupVersion,
    counters: &RawCounters,
    clock_ticks: u64,
) -> Result<CgroupCpuDockerStat> {
    CgroupDockerStat::from_counters(id.clone(), version, counters)
        .map(|raw| raw.normalize(clock_ticks))
}
