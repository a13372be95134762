//! Normalized container statistics built from [`RawCounters`](super::RawCounters).
//!
//! # Main types
//!
//! - [`CgroupDockerStat`]: raw CPU counters of one container in the unit the kernel reports.
//! - [`CgroupCpuDockerStat`]: CPU times converted to seconds plus a textual summary.
//! - [`CgroupMemStat`]: memory usage, limit, cache, and failure counters.
//!
//! Required counters that are missing are reported as
//! [`Error::IncompleteAccountingData`](crate::Error::IncompleteAccountingData), never as zeros.

mod cpu;
mod memory;

pub use cpu::{CgroupCpuDockerStat, CgroupDockerStat, CounterUnit, normalize_cpu};
pub use memory::{
    CgroupMemStat, DEFAULT_PAGE_SIZE, MemoryLimit, UNLIMITED_SENTINEL, normalize_memory,
    unlimited_sentinel,
};

use crate::container::ContainerID;
use crate::error::Error;

use super::{Domain, RawCounters};

/// Looks up a counter whose absence makes the record meaningless.
fn require(
    counters: &RawCounters,
    key: &'static str,
    id: &ContainerID,
    domain: Domain,
) -> Result<u64, Error> {
    counters
        .get(key)
        .ok_or_else(|| Error::IncompleteAccountingData {
            id: id.to_string(),
            domain,
            key,
        })
}
