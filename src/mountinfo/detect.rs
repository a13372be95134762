use crate::fsutil;

use super::parser::parse_mount_info_line;
use super::{Error, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Cgroup mount points found in a mountinfo file.
///
/// Paths are exactly as listed in the file, i.e. relative to the root of the process whose
/// mountinfo was read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CgroupMounts {
    /// Mount point of the unified (`cgroup2`) hierarchy.
    pub unified: Option<PathBuf>,
    /// Mount point of the v1 hierarchy carrying the `cpuacct` controller.
    pub cpuacct: Option<PathBuf>,
    /// Mount point of the v1 hierarchy carrying the `memory` controller.
    pub memory: Option<PathBuf>,
}

impl CgroupMounts {
    /// Returns `true` if both v1 controllers needed for accounting are mounted.
    pub fn has_v1_accounting(&self) -> bool {
        self.cpuacct.is_some() && self.memory.is_some()
    }
}

/// Detects cgroup v1 controller mounts and the cgroup v2 mount by parsing a `mountinfo` file.
///
/// For each hierarchy the first matching entry wins.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if parsing any line fails.
///
/// # Example
///
/// ```no_run
/// use cgstat::mountinfo::detect_cgroup_mounts;
///
/// let mounts = detect_cgroup_mounts("/proc/self/mountinfo").unwrap();
/// println!("unified hierarchy: {:?}", mounts.unified);
/// ```
pub fn detect_cgroup_mounts(path: impl AsRef<Path>) -> Result<CgroupMounts> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    detect_cgroup_mounts_from_reader(buf, path)
}

/// Reader-based implementation of [`detect_cgroup_mounts`].
///
/// `origin` is only used in error messages.
fn detect_cgroup_mounts_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
) -> Result<CgroupMounts> {
    let mut line = String::with_capacity(256);
    let mut mounts = CgroupMounts::default();

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let mount_info = parse_mount_info_line(line.as_str()).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        match mount_info.fs_type {
            "cgroup2" if mounts.unified.is_none() => {
                log::debug!(
                    "Found `cgroup2` mount point with root `{}`: {}",
                    mount_info.root,
                    mount_info.mount_point
                );
                mounts.unified = Some(PathBuf::from(mount_info.mount_point));
            }
            "cgroup" => {
                if mounts.cpuacct.is_none() && mount_info.has_super_option("cpuacct") {
                    log::debug!("Found `cpuacct` controller at {}", mount_info.mount_point);
                    mounts.cpuacct = Some(PathBuf::from(mount_info.mount_point));
                }
                if mounts.memory.is_none() && mount_info.has_super_option("memory") {
                    log::debug!("Found `memory` controller at {}", mount_info.mount_point);
                    mounts.memory = Some(PathBuf::from(mount_info.mount_point));
                }
            }
            _ => {}
        }

        line.clear();
    }

    Ok(mounts)
}
