//! Locates cgroup mount points from a Linux `mountinfo` file.
mod detect;
mod error;
mod parser;

pub use detect::{CgroupMounts, detect_cgroup_mounts};
pub use error::{Error, Result};
pub use parser::{MountInfo, MountInfoField, ParseError, parse_mount_info_line};
