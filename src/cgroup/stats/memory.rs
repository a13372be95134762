//! Memory accounting of a container.
//!
//! Maps the version specific keys of `memory.stat` and the scalar usage/limit files to one
//! [`CgroupMemStat`] shape. Counters a version does not expose (e.g. `pgpgin` on v2) are
//! reported as `0`.
//!
//! # Limits
//!
//! "No limit" is spelled `max` in v2 `memory.max` and as a huge page-rounded number in v1
//! `memory.limit_in_bytes`. Both are mapped to [`MemoryLimit::Unbounded`] instead of being
//! reported as a byte count.

use serde::Serialize;

use crate::cgroup::{CgroupVersion, Domain, RawCounters};
use crate::container::ContainerID;
use crate::error::Result;

/// Page size assumed when `sysconf(_SC_PAGESIZE)` fails.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Smallest raw limit treated as "no limit" with the default page size.
pub const UNLIMITED_SENTINEL: u64 = unlimited_sentinel(DEFAULT_PAGE_SIZE);

/// Smallest raw limit treated as "no limit" on a host with `page_size` byte pages.
///
/// cgroup v1 reports an unset limit as `PAGE_COUNTER_MAX` pages, i.e. `i64::MAX` rounded down to
/// the page size: `0x7FFF_FFFF_FFFF_F000` with 4 KiB pages, `0x7FFF_FFFF_FFFF_0000` with 64 KiB
/// pages.
///
/// ```
/// # use cgstat::cgroup::stats::unlimited_sentinel;
/// assert_eq!(unlimited_sentinel(4096), 0x7FFF_FFFF_FFFF_F000);
/// assert_eq!(unlimited_sentinel(65536), 0x7FFF_FFFF_FFFF_0000);
/// ```
pub const fn unlimited_sentinel(page_size: u64) -> u64 {
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.next_power_of_two()
    };
    (i64::MAX as u64) & !(page_size - 1)
}

/// A memory limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLimit {
    Unbounded,
    Bytes(u64),
}

impl MemoryLimit {
    /// Interprets a raw limit counter read on a host with `page_size` byte pages.
    ///
    /// ```
    /// # use cgstat::cgroup::stats::MemoryLimit;
    /// assert_eq!(MemoryLimit::from_raw(104857600, 4096), MemoryLimit::Bytes(104857600));
    /// assert!(MemoryLimit::from_raw(9223372036854771712, 4096).is_unbounded());
    /// assert!(MemoryLimit::from_raw(9223372036854710272, 65536).is_unbounded());
    /// assert!(MemoryLimit::from_raw(u64::MAX, 4096).is_unbounded());
    /// ```
    pub fn from_raw(raw: u64, page_size: u64) -> Self {
        if raw >= unlimited_sentinel(page_size) {
            MemoryLimit::Unbounded
        } else {
            MemoryLimit::Bytes(raw)
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, MemoryLimit::Unbounded)
    }

    /// The limit in bytes, or `None` if unbounded.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            MemoryLimit::Unbounded => None,
            MemoryLimit::Bytes(bytes) => Some(*bytes),
        }
    }
}

/// Memory statistic of one container. All sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CgroupMemStat {
    pub container_id: ContainerID,
    pub usage_bytes: u64,
    /// Highest recorded usage, if the kernel tracks it.
    pub max_usage_bytes: Option<u64>,
    pub limit: MemoryLimit,
    /// Effective limit including ancestors (v1 only).
    pub hierarchical_limit: Option<MemoryLimit>,
    /// Page cache (`cache` on v1, `file` on v2).
    pub cache: u64,
    /// Anonymous memory (`rss` on v1, `anon` on v2).
    pub rss: u64,
    pub rss_huge: u64,
    pub mapped_file: u64,
    pub pgpgin: u64,
    pub pgpgout: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
    pub active_anon: u64,
    pub inactive_anon: u64,
    pub active_file: u64,
    pub inactive_file: u64,
    pub unevictable: u64,
    /// Number of times usage hit the limit.
    pub fail_count: u64,
}

/// Normalizes the memory counters of one container. `page_size` decides which raw limits mean
/// "no limit".
///
/// # Errors
///
/// Returns [`Error::IncompleteAccountingData`](crate::Error::IncompleteAccountingData) if usage,
/// limit, or cache is missing.
///
/// # Example
///
/// ```rust
/// use cgstat::cgroup::{CgroupVersion, RawCounters};
/// use cgstat::cgroup::stats::{MemoryLimit, normalize_memory};
/// use cgstat::container::ContainerID;
///
/// let id = ContainerID::new("abc123").unwrap();
/// let counters = RawCounters::from([("usage", 8192), ("limit", u64::MAX), ("file", 4096)]);
/// let stat = normalize_memory(&id, CgroupVersion::V2, &counters, 4096).unwrap();
///
/// assert_eq!(stat.usage_bytes, 8192);
/// assert_eq!(stat.limit, MemoryLimit::Unbounded);
/// assert_eq!(stat.cache, 4096);
/// ```
pub fn normalize_memory(
    id: &ContainerID,
    version: CgroupVersion,
    counters: &RawCounters,
    page_size: u64,
) -> Result<CgroupMemStat> {
    let keys = version.memory_keys();
    let usage_bytes = super::require(counters, keys.usage, id, Domain::Memory)?;
    let limit = super::require(counters, keys.limit, id, Domain::Memory)?;
    let cache = super::require(counters, keys.cache, id, Domain::Memory)?;

    let optional = |key: Option<&str>| key.and_then(|key| counters.get(key)).unwrap_or(0);
    let counter = |key: &str| counters.get(key).unwrap_or(0);

    Ok(CgroupMemStat {
        container_id: id.clone(),
        usage_bytes,
        max_usage_bytes: counters.get(keys.max_usage),
        limit: MemoryLimit::from_raw(limit, page_size),
        hierarchical_limit: keys
            .hierarchical_limit
            .and_then(|key| counters.get(key))
            .map(|limit| MemoryLimit::from_raw(limit, page_size)),
        cache,
        rss: counter(keys.rss),
        rss_huge: counter(keys.rss_huge),
        mapped_file: counter(keys.mapped_file),
        pgpgin: optional(keys.pgpgin),
        pgpgout: optional(keys.pgpgout),
        pgfault: counter(keys.pgfault),
        pgmajfault: counter(keys.pgmajfault),
        active_anon: counter(keys.active_anon),
        inactive_anon: counter(keys.inactive_anon),
        active_file: counter(keys.active_file),
        inactive_file: counter(keys.inactive_file),
        unevictable: counter(keys.unevictable),
        fail_count: counter(keys.fail_count),
    })
}
