//! Runtime configuration.
//!
//! [`Config::from_env`] mirrors how the monitor is deployed: directly on the host, or inside a
//! privileged container with the host's root filesystem mounted at `ROOTFS_MOUNT_PATH`.

use std::path::{Path, PathBuf};

use crate::cgroup::stats::DEFAULT_PAGE_SIZE;

/// USER_HZ assumed when `sysconf(_SC_CLK_TCK)` fails.
const DEFAULT_CLOCK_TICKS: u64 = 100;

/// Parent cgroup used by Docker's `cgroupfs` driver.
const DEFAULT_CGROUP_PARENT: &str = "docker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the host filesystem. `/` on the host.
    pub rootfs: PathBuf,
    /// Explicit cgroup root. When set, the mount table is not consulted and the layout below this
    /// directory decides the cgroup version.
    pub cgroup_root: Option<PathBuf>,
    /// Mount table used to locate cgroup hierarchies.
    pub mountinfo: PathBuf,
    /// Parent cgroup of containers (`--cgroup-parent` of the Docker daemon).
    pub cgroup_parent: String,
    /// Kernel clock ticks per second (USER_HZ), the unit of cgroup v1 `cpuacct.stat`.
    pub clock_ticks: u64,
    /// Memory page size in bytes. Decides which cgroup v1 memory limits mean "no limit".
    pub page_size: u64,
    /// Path to `/proc/stat` for host CPU times.
    pub proc_stat: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_rootfs("/")
    }
}

impl Config {
    /// Creates a configuration where every host path is resolved below `rootfs`.
    pub fn with_rootfs(rootfs: impl Into<PathBuf>) -> Self {
        let rootfs = rootfs.into();
        Self {
            cgroup_root: None,
            mountinfo: rootfs.join("proc/1/mountinfo"),
            cgroup_parent: DEFAULT_CGROUP_PARENT.to_owned(),
            clock_ticks: clock_ticks(),
            page_size: page_size(),
            proc_stat: rootfs.join("proc/stat"),
            rootfs,
        }
    }

    /// Creates a configuration that probes the layout below `root` directly.
    pub fn with_cgroup_root(root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Builds the configuration from the process environment.
    ///
    /// - `ROOTFS_MOUNT_PATH` (default `/rootfs`) is used as rootfs only if the process runs inside
    ///   a container and the directory exists.
    /// - `CGROUP_ROOT` overrides mount table detection.
    /// - `CGROUP_PARENT` overrides the default `docker` parent cgroup.
    pub fn from_env() -> Self {
        let rootfs = std::env::var_os("ROOTFS_MOUNT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/rootfs"));
        let rootfs = if running_in_container(&rootfs) {
            if rootfs.exists() {
                rootfs
            } else {
                log::warn!(
                    "running inside a container, but host root mount `{}` is missing; reading the container's own view",
                    rootfs.display()
                );
                PathBuf::from("/")
            }
        } else {
            PathBuf::from("/")
        };
        log::debug!("rootfs: {}", rootfs.display());

        let mut config = Self::with_rootfs(rootfs);
        if let Some(root) = std::env::var_os("CGROUP_ROOT") {
            config.cgroup_root = Some(PathBuf::from(root));
        }
        if let Ok(parent) = std::env::var("CGROUP_PARENT") {
            if !parent.is_empty() {
                config.cgroup_parent = parent;
            }
        }
        config
    }

    /// Joins an absolute host path (as listed in a mount table) onto the rootfs.
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.rootfs.join(path.strip_prefix("/").unwrap_or(path))
    }
}

/// Reads USER_HZ from the kernel.
fn clock_ticks() -> u64 {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 {
        hz as u64
    } else {
        DEFAULT_CLOCK_TICKS
    }
}

/// Reads the memory page size from the kernel.
fn page_size() -> u64 {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Heuristically detects whether this process runs inside a container.
///
/// Any failing check is logged and treated as "no evidence".
fn running_in_container(rootfs: &Path) -> bool {
    let self_ns = std::fs::read_link("/proc/self/ns/pid");
    let init_ns = std::fs::read_link(rootfs.join("proc/1/ns/pid"))
        .or_else(|_| std::fs::read_link("/proc/1/ns/pid"));
    match (self_ns, init_ns) {
        (Ok(own), Ok(init)) if own != init => return true,
        (Ok(_), Ok(_)) => {}
        (Err(err), _) | (_, Err(err)) => {
            log::warn!("PID namespace check failed when detecting runtime environment: {err}")
        }
    }

    Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
        || std::env::var_os("container").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_rootfs_places_host_files_below_rootfs() {
        let config = Config::with_rootfs("/rootfs");
        assert_eq!(config.mountinfo, PathBuf::from("/rootfs/proc/1/mountinfo"));
        assert_eq!(config.proc_stat, PathBuf::from("/rootfs/proc/stat"));
        assert_eq!(config.cgroup_parent, "docker");
        assert!(config.cgroup_root.is_none());
        assert!(config.clock_ticks > 0);
        assert!(config.page_size.is_power_of_two());
    }

    #[test]
    fn test_host_path_reroots_absolute_paths() {
        let config = Config::with_rootfs("/rootfs");
        assert_eq!(
            config.host_path("/sys/fs/cgroup"),
            PathBuf::from("/rootfs/sys/fs/cgroup")
        );

        let config = Config::default();
        assert_eq!(
            config.host_path("/sys/fs/cgroup"),
            PathBuf::from("/sys/fs/cgroup")
        );
    }

    #[test]
    fn test_with_cgroup_root() {
        let config = Config::with_cgroup_root("/tmp/cgroup");
        assert_eq!(config.cgroup_root, Some(PathBuf::from("/tmp/cgroup")));
        assert_eq!(config.rootfs, PathBuf::from("/"));
    }
}
