//! cgstat: per-container CPU and memory accounting read straight from the cgroup filesystem.
//!
//! The library discovers running Docker containers, locates their cgroup directories on
//! either a v1 (per-controller) or v2 (unified) hierarchy, and normalizes the kernel's raw
//! counters into version independent statistics. No container runtime API is contacted.
//!
//! Start with [`CgroupAccounting`]; every query takes a [`QueryContext`] for cooperative
//! cancellation.

pub mod cgroup;
pub mod config;
pub mod container;
pub mod context;
pub mod docker;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod mountinfo;
pub mod times;

// When running inside a container, the host's root filesystem has to be mounted (e.g. at
// `/rootfs`) and the container has to share the host's PID namespace or be privileged, otherwise
// only the container's own cgroup namespace is visible.

pub use config::Config;
pub use context::{Canceller, QueryContext};
pub use docker::CgroupAccounting;
pub use error::{Error, Result};
