//! Container resource accounting through the Linux cgroup filesystem.
//!
//! Both hierarchy generations are supported transparently:
//!
//! - **v1**: one mount per controller. Containers live at
//!   `<controller mount>/<parent>/<id>`, CPU time comes from `cpuacct.stat` (USER_HZ ticks) and
//!   `cpuacct.usage` (nanoseconds), memory from `memory.stat`, `memory.usage_in_bytes` and
//!   `memory.limit_in_bytes`.
//! - **v2**: a single unified mount. Containers live at
//!   `<unified>/system.slice/docker-<id>.scope` (systemd driver) or `<unified>/<parent>/<id>`
//!   (cgroupfs driver), CPU time comes from `cpu.stat` (microseconds), memory from
//!   `memory.stat`, `memory.current` and `memory.max`.
//!
//! # Key Components
//!
//! - [`Hierarchy`]: The probed layout, carrying mount points and the per-version file tables.
//! - [`PathResolver`]: Caches the probed hierarchy and maps container ids to accounting files.
//! - [`RawCounters`]: Field name to counter mapping read from accounting files.
//! - [`stats`]: Normalized CPU and memory statistics.
use std::fmt;

use serde::Serialize;

mod counters;
mod discovery;
mod hierarchy;
mod resolver;
pub mod stats;

pub use counters::{RawCounters, read_counters, read_counters_into};
pub use discovery::list_container_ids;
pub use hierarchy::{CounterFile, CounterFormat, Hierarchy};
pub use resolver::{PathResolver, ResolvedPath};

/// Accounting domain of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cpu,
    Memory,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Domain::Cpu => "cpu",
            Domain::Memory => "memory",
        })
    }
}

/// Cgroup hierarchy generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CgroupVersion {
    V1,
    V2,
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CgroupVersion::V1 => "v1",
            CgroupVersion::V2 => "v2",
        })
    }
}
