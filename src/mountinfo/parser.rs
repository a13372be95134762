//! Mountinfo line parser for Linux systems.
//!
//! Parses lines in `/proc/[pid]/mountinfo` format. See
//! [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for details on the structure.

/// The fields of a mountinfo line needed to locate cgroup hierarchies.
#[derive(Debug, PartialEq, Eq)]
pub struct MountInfo<'a> {
    /// Root of the mount within the filesystem.
    pub root: &'a str,
    /// Mount point relative to the process's root.
    pub mount_point: &'a str,
    /// Filesystem type (e.g., `cgroup`, `cgroup2`).
    pub fs_type: &'a str,
    /// Superblock options. For cgroup v1 mounts these list the attached controllers.
    pub super_options: &'a str,
}

impl MountInfo<'_> {
    /// Returns `true` if `option` is one of the comma-separated superblock options.
    pub fn has_super_option(&self, option: &str) -> bool {
        self.super_options.split(',').any(|o| o == option)
    }
}

/// Named fields in a mountinfo line.
#[derive(Debug, Clone, Copy)]
pub enum MountInfoField {
    MountId,
    ParentId,
    MajorMinor,
    Root,
    MountPoint,
    FsType,
    Source,
    SuperOptions,
}

impl std::fmt::Display for MountInfoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MountInfoField::MountId => "mount_id",
            MountInfoField::ParentId => "parent_id",
            MountInfoField::MajorMinor => "major:minor",
            MountInfoField::Root => "root",
            MountInfoField::MountPoint => "mount_point",
            MountInfoField::FsType => "fs_type",
            MountInfoField::Source => "source",
            MountInfoField::SuperOptions => "super_options",
        };
        write!(f, "{name}")
    }
}

/// Errors that may occur when parsing a mountinfo line.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ParseError {
    #[error("missing separator ` - ` in line: `{0}`")]
    MissingSeparator(String),

    #[error("missing `{field}` in pre-separator section of line: `{line}`")]
    MissingPreSeparatorField { field: MountInfoField, line: String },

    #[error("missing `{field}` in post-separator section of line: `{line}`")]
    MissingPostSeparatorField { field: MountInfoField, line: String },
}

/// Parses a single line of mountinfo data without allocating.
///
/// # Errors
///
/// Returns [`ParseError`] variants for a missing separator or missing required fields.
pub fn parse_mount_info_line(line: &str) -> Result<MountInfo<'_>, ParseError> {
    let (pre, post) = line
        .split_once(" - ")
        .ok_or_else(|| ParseError::MissingSeparator(line.trim_end().to_owned()))?;

    let mut pre_fields = pre.split_whitespace();
    let mut pre_field = |field| {
        pre_fields
            .next()
            .ok_or_else(|| ParseError::MissingPreSeparatorField {
                field,
                line: line.trim_end().to_owned(),
            })
    };
    pre_field(MountInfoField::MountId)?;
    pre_field(MountInfoField::ParentId)?;
    pre_field(MountInfoField::MajorMinor)?;
    let root = pre_field(MountInfoField::Root)?;
    let mount_point = pre_field(MountInfoField::MountPoint)?;

    let mut post_fields = post.split_whitespace();
    let mut post_field = |field| {
        post_fields
            .next()
            .ok_or_else(|| ParseError::MissingPostSeparatorField {
                field,
                line: line.trim_end().to_owned(),
            })
    };
    let fs_type = post_field(MountInfoField::FsType)?;
    post_field(MountInfoField::Source)?;
    let super_options = post_field(MountInfoField::SuperOptions)?;

    Ok(MountInfo {
        root,
        mount_point,
        fs_type,
        super_options,
    })
}
