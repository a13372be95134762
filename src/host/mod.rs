//! Host-wide CPU times.
//!
//! Container usage is usually put in relation to the host. [`CpuSnapshotSource`] hides how a
//! platform exposes per-CPU counters; [`ProcStat`] reads them from Linux `/proc/stat`.

mod proc_stat;

pub use proc_stat::ProcStat;

use crate::error::Result;
use crate::times::CpuTimes;

/// A source of cumulative host CPU times.
pub trait CpuSnapshotSource {
    /// Returns the aggregate CPU times, labelled `cpu-total`, or one record per logical CPU
    /// (`cpu0`, `cpu1`, ...) if `per_cpu` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostCpuUnavailable`](crate::Error::HostCpuUnavailable) if the counters
    /// cannot be read.
    fn cpu_times(&self, per_cpu: bool) -> Result<Vec<CpuTimes>>;
}
