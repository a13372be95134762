use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::container::ContainerID;
use crate::error::{Error, Result, ResultOkLogExt};
use crate::mountinfo;

use super::stats::CounterUnit;
use super::{CgroupVersion, Domain};

/// Directory holding systemd-managed container scopes below the unified mount.
const SYSTEMD_SLICE: &str = "system.slice";
const SCOPE_PREFIX: &str = "docker-";
const SCOPE_SUFFIX: &str = ".scope";

/// The detected cgroup layout of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hierarchy {
    /// Per-controller mounts.
    V1 { cpuacct: PathBuf, memory: PathBuf },
    /// Single unified mount.
    V2 { unified: PathBuf },
}

/// How the content of an accounting file is turned into counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterFormat {
    /// `key value` lines. Keys are stored with `prefix` prepended.
    KeyValue { prefix: &'static str },
    /// A single value stored under `key`. `max` is read as [`u64::MAX`].
    Scalar { key: &'static str },
}

/// One accounting file of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterFile {
    pub name: &'static str,
    pub format: CounterFormat,
    /// Whether the query fails when the file cannot be read.
    pub required: bool,
}

const fn key_value(name: &'static str, prefix: &'static str, required: bool) -> CounterFile {
    CounterFile {
        name,
        format: CounterFormat::KeyValue { prefix },
        required,
    }
}

const fn scalar(name: &'static str, key: &'static str, required: bool) -> CounterFile {
    CounterFile {
        name,
        format: CounterFormat::Scalar { key },
        required,
    }
}

// Scalar files land under the same canonical keys on both versions.
pub(crate) const USAGE_KEY: &str = "usage";
pub(crate) const LIMIT_KEY: &str = "limit";
pub(crate) const MAX_USAGE_KEY: &str = "max_usage";
pub(crate) const FAILCNT_KEY: &str = "failcnt";

const V1_CPU_FILES: &[CounterFile] = &[
    key_value("cpuacct.stat", "", true),
    scalar("cpuacct.usage", USAGE_KEY, false),
];

const V2_CPU_FILES: &[CounterFile] = &[key_value("cpu.stat", "", true)];

const V1_MEMORY_FILES: &[CounterFile] = &[
    key_value("memory.stat", "", true),
    scalar("memory.usage_in_bytes", USAGE_KEY, true),
    scalar("memory.limit_in_bytes", LIMIT_KEY, true),
    scalar("memory.max_usage_in_bytes", MAX_USAGE_KEY, false),
    scalar("memory.failcnt", FAILCNT_KEY, false),
];

const V2_MEMORY_FILES: &[CounterFile] = &[
    key_value("memory.stat", "", true),
    scalar("memory.current", USAGE_KEY, true),
    scalar("memory.max", LIMIT_KEY, true),
    scalar("memory.peak", MAX_USAGE_KEY, false),
    key_value("memory.events", "events.", false),
];

/// Raw keys of the CPU counters and the unit the kernel reports them in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CpuKeys {
    pub user: &'static str,
    pub system: &'static str,
    pub usage: &'static str,
    pub times_unit: CounterUnit,
    pub usage_unit: CounterUnit,
}

const V1_CPU_KEYS: CpuKeys = CpuKeys {
    user: "user",
    system: "system",
    usage: USAGE_KEY,
    times_unit: CounterUnit::Ticks,
    usage_unit: CounterUnit::Nanoseconds,
};

const V2_CPU_KEYS: CpuKeys = CpuKeys {
    user: "user_usec",
    system: "system_usec",
    usage: "usage_usec",
    times_unit: CounterUnit::Microseconds,
    usage_unit: CounterUnit::Microseconds,
};

/// Raw keys of the memory counters. `None` marks counters a version does not expose.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemoryKeys {
    pub usage: &'static str,
    pub limit: &'static str,
    pub cache: &'static str,
    pub max_usage: &'static str,
    pub hierarchical_limit: Option<&'static str>,
    pub rss: &'static str,
    pub rss_huge: &'static str,
    pub mapped_file: &'static str,
    pub pgpgin: Option<&'static str>,
    pub pgpgout: Option<&'static str>,
    pub pgfault: &'static str,
    pub pgmajfault: &'static str,
    pub active_anon: &'static str,
    pub inactive_anon: &'static str,
    pub active_file: &'static str,
    pub inactive_file: &'static str,
    pub unevictable: &'static str,
    pub fail_count: &'static str,
}

const V1_MEMORY_KEYS: MemoryKeys = MemoryKeys {
    usage: USAGE_KEY,
    limit: LIMIT_KEY,
    cache: "cache",
    max_usage: MAX_USAGE_KEY,
    hierarchical_limit: Some("hierarchical_memory_limit"),
    rss: "rss",
    rss_huge: "rss_huge",
    mapped_file: "mapped_file",
    pgpgin: Some("pgpgin"),
    pgpgout: Some("pgpgout"),
    pgfault: "pgfault",
    pgmajfault: "pgmajfault",
    active_anon: "active_anon",
    inactive_anon: "inactive_anon",
    active_file: "active_file",
    inactive_file: "inactive_file",
    unevictable: "unevictable",
    fail_count: FAILCNT_KEY,
};

const V2_MEMORY_KEYS: MemoryKeys = MemoryKeys {
    usage: USAGE_KEY,
    limit: LIMIT_KEY,
    cache: "file",
    max_usage: MAX_USAGE_KEY,
    hierarchical_limit: None,
    rss: "anon",
    rss_huge: "anon_thp",
    mapped_file: "file_mapped",
    pgpgin: None,
    pgpgout: None,
    pgfault: "pgfault",
    pgmajfault: "pgmajfault",
    active_anon: "active_anon",
    inactive_anon: "inactive_anon",
    active_file: "active_file",
    inactive_file: "inactive_file",
    unevictable: "unevictable",
    // number of times usage hit `memory.max`, the v2 counterpart of `memory.failcnt`
    fail_count: "events.max",
};

impl CgroupVersion {
    /// Accounting files of `domain`. The first entry is the domain's primary stat file.
    pub fn counter_files(self, domain: Domain) -> &'static [CounterFile] {
        match (self, domain) {
            (CgroupVersion::V1, Domain::Cpu) => V1_CPU_FILES,
            (CgroupVersion::V1, Domain::Memory) => V1_MEMORY_FILES,
            (CgroupVersion::V2, Domain::Cpu) => V2_CPU_FILES,
            (CgroupVersion::V2, Domain::Memory) => V2_MEMORY_FILES,
        }
    }

    pub(crate) fn cpu_keys(self) -> CpuKeys {
        match self {
            CgroupVersion::V1 => V1_CPU_KEYS,
            CgroupVersion::V2 => V2_CPU_KEYS,
        }
    }

    pub(crate) fn memory_keys(self) -> MemoryKeys {
        match self {
            CgroupVersion::V1 => V1_MEMORY_KEYS,
            CgroupVersion::V2 => V2_MEMORY_KEYS,
        }
    }
}

/// How container directories are named below a discovery root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Naming {
    /// The directory name is the container id.
    Bare,
    /// `docker-<id>.scope`, as created by the systemd cgroup driver.
    SystemdScope,
}

impl Naming {
    pub(crate) fn extract_id(self, name: &str) -> Option<ContainerID> {
        let raw = match self {
            Naming::Bare => name,
            Naming::SystemdScope => name
                .strip_prefix(SCOPE_PREFIX)?
                .strip_suffix(SCOPE_SUFFIX)?,
        };
        ContainerID::from_docker_id(raw)
    }
}

impl Hierarchy {
    pub fn version(&self) -> CgroupVersion {
        match self {
            Hierarchy::V1 { .. } => CgroupVersion::V1,
            Hierarchy::V2 { .. } => CgroupVersion::V2,
        }
    }

    /// Probes the host's cgroup layout.
    ///
    /// An explicit [`Config::cgroup_root`] is probed directly. Otherwise the mount table decides:
    /// v1 if both the `cpuacct` and `memory` controllers are mounted, else v2 if a `cgroup2`
    /// filesystem is mounted. If the mount table cannot be used, the layout of
    /// `<rootfs>/sys/fs/cgroup` is probed instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    pub fn probe(config: &Config) -> Result<Self> {
        if let Some(root) = &config.cgroup_root {
            return Self::probe_layout(root).ok_or_else(|| Error::UnsupportedCgroupVersion {
                root: root.clone(),
            });
        }

        let mounts = mountinfo::detect_cgroup_mounts(&config.mountinfo).ok_log();
        if let Some(hierarchy) = mounts.and_then(|mounts| Self::from_mounts(&mounts, config)) {
            return Ok(hierarchy);
        }
        log::warn!(
            "no usable cgroup mount listed in `{}`, probing default location",
            config.mountinfo.display()
        );

        let root = config.host_path("/sys/fs/cgroup");
        Self::probe_layout(&root).ok_or(Error::UnsupportedCgroupVersion { root })
    }

    fn from_mounts(mounts: &mountinfo::CgroupMounts, config: &Config) -> Option<Self> {
        if let (Some(cpuacct), Some(memory)) = (&mounts.cpuacct, &mounts.memory) {
            return Some(Hierarchy::V1 {
                cpuacct: config.host_path(cpuacct),
                memory: config.host_path(memory),
            });
        }
        mounts.unified.as_ref().map(|unified| Hierarchy::V2 {
            unified: config.host_path(unified),
        })
    }

    /// Detects the layout below a cgroup root directory.
    ///
    /// v1 roots contain one directory per controller, v2 roots expose `cgroup.controllers`.
    pub fn probe_layout(root: &Path) -> Option<Self> {
        let cpuacct = root.join("cpuacct");
        let memory = root.join("memory");
        if cpuacct.is_dir() && memory.is_dir() {
            return Some(Hierarchy::V1 { cpuacct, memory });
        }
        if root.join("cgroup.controllers").is_file() {
            return Some(Hierarchy::V2 {
                unified: root.to_path_buf(),
            });
        }
        None
    }

    /// Candidate directories of a container, in lookup order.
    pub(crate) fn container_dirs(
        &self,
        domain: Domain,
        parent: &str,
        id: &ContainerID,
    ) -> Vec<PathBuf> {
        match self {
            Hierarchy::V1 { cpuacct, memory } => {
                let controller = match domain {
                    Domain::Cpu => cpuacct,
                    Domain::Memory => memory,
                };
                vec![controller.join(parent).join(id.as_ref())]
            }
            Hierarchy::V2 { unified } => vec![
                unified
                    .join(SYSTEMD_SLICE)
                    .join(format!("{SCOPE_PREFIX}{id}{SCOPE_SUFFIX}")),
                unified.join(parent).join(id.as_ref()),
            ],
        }
    }

    /// Directories whose children are container cgroups.
    pub(crate) fn discovery_roots(&self, parent: &str) -> Vec<(PathBuf, Naming)> {
        match self {
            Hierarchy::V1 { cpuacct, .. } => vec![(cpuacct.join(parent), Naming::Bare)],
            Hierarchy::V2 { unified } => vec![
                (unified.join(SYSTEMD_SLICE), Naming::SystemdScope),
                (unified.join(parent), Naming::Bare),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_probe_layout_v1() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("cpuacct")).unwrap();
        std::fs::create_dir(root.path().join("memory")).unwrap();

        let hierarchy = Hierarchy::probe_layout(root.path()).unwrap();
        assert_eq!(hierarchy.version(), CgroupVersion::V1);
    }

    #[test]
    fn test_probe_layout_v2() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("cgroup.controllers"), "cpu memory io\n").unwrap();

        let hierarchy = Hierarchy::probe_layout(root.path()).unwrap();
        assert_eq!(
            hierarchy,
            Hierarchy::V2 {
                unified: root.path().to_path_buf()
            }
        );
    }

    #[test]
    fn test_probe_layout_unknown() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("cpuacct")).unwrap();
        assert!(Hierarchy::probe_layout(root.path()).is_none());
    }

    #[test]
    fn test_probe_with_explicit_root_unsupported() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::with_cgroup_root(root.path());
        let err = Hierarchy::probe(&config).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCgroupVersion { root: r } if r == root.path()));
    }

    #[test]
    fn test_probe_prefers_v1_controllers_from_mount_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut mountinfo = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            mountinfo,
            "30 24 0:26 / {}/unified rw - cgroup2 cgroup2 rw,nsdelegate",
            dir.path().display()
        )
        .unwrap();
        writeln!(
            mountinfo,
            "33 24 0:28 / {}/cpu,cpuacct rw - cgroup cgroup rw,cpu,cpuacct",
            dir.path().display()
        )
        .unwrap();
        writeln!(
            mountinfo,
            "34 24 0:29 / {}/memory rw - cgroup cgroup rw,memory",
            dir.path().display()
        )
        .unwrap();

        let config = Config {
            mountinfo: mountinfo.path().to_path_buf(),
            ..Config::default()
        };
        let hierarchy = Hierarchy::probe(&config).unwrap();
        assert_eq!(
            hierarchy,
            Hierarchy::V1 {
                cpuacct: dir.path().join("cpu,cpuacct"),
                memory: dir.path().join("memory"),
            }
        );
    }

    #[test]
    fn test_probe_unified_from_mount_table_under_rootfs() {
        let mut mountinfo = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            mountinfo,
            "35 24 0:30 / /sys/fs/cgroup rw - cgroup2 cgroup2 rw,nsdelegate"
        )
        .unwrap();

        let config = Config {
            mountinfo: mountinfo.path().to_path_buf(),
            ..Config::with_rootfs("/rootfs")
        };
        let hierarchy = Hierarchy::probe(&config).unwrap();
        assert_eq!(
            hierarchy,
            Hierarchy::V2 {
                unified: PathBuf::from("/rootfs/sys/fs/cgroup")
            }
        );
    }

    #[test]
    fn test_probe_falls_back_to_layout_when_mount_table_missing() {
        let rootfs = tempfile::tempdir().unwrap();
        let cgroup = rootfs.path().join("sys/fs/cgroup");
        std::fs::create_dir_all(&cgroup).unwrap();
        std::fs::write(cgroup.join("cgroup.controllers"), "cpu memory\n").unwrap();

        let config = Config::with_rootfs(rootfs.path());
        let hierarchy = Hierarchy::probe(&config).unwrap();
        assert_eq!(hierarchy, Hierarchy::V2 { unified: cgroup });
    }

    #[test]
    fn test_probe_falls_back_when_mount_table_lists_no_cgroups() {
        let rootfs = tempfile::tempdir().unwrap();
        let cgroup = rootfs.path().join("sys/fs/cgroup");
        std::fs::create_dir_all(cgroup.join("cpuacct")).unwrap();
        std::fs::create_dir_all(cgroup.join("memory")).unwrap();
        let mountinfo = rootfs.path().join("proc/1/mountinfo");
        std::fs::create_dir_all(mountinfo.parent().unwrap()).unwrap();
        std::fs::write(&mountinfo, "25 1 0:24 / /proc rw,relatime - proc proc rw\n").unwrap();

        let hierarchy = Hierarchy::probe(&Config::with_rootfs(rootfs.path())).unwrap();
        assert_eq!(hierarchy.version(), CgroupVersion::V1);
    }

    #[test]
    fn test_container_dirs_v1_use_domain_controller() {
        let hierarchy = Hierarchy::V1 {
            cpuacct: PathBuf::from("/sys/fs/cgroup/cpuacct"),
            memory: PathBuf::from("/sys/fs/cgroup/memory"),
        };
        let id = ContainerID::new("abc123").unwrap();
        assert_eq!(
            hierarchy.container_dirs(Domain::Cpu, "docker", &id),
            vec![PathBuf::from("/sys/fs/cgroup/cpuacct/docker/abc123")]
        );
        assert_eq!(
            hierarchy.container_dirs(Domain::Memory, "docker", &id),
            vec![PathBuf::from("/sys/fs/cgroup/memory/docker/abc123")]
        );
    }

    #[test]
    fn test_container_dirs_v2_prefer_systemd_scope() {
        let hierarchy = Hierarchy::V2 {
            unified: PathBuf::from("/sys/fs/cgroup"),
        };
        let id = ContainerID::new("abc123").unwrap();
        assert_eq!(
            hierarchy.container_dirs(Domain::Cpu, "docker", &id),
            vec![
                PathBuf::from("/sys/fs/cgroup/system.slice/docker-abc123.scope"),
                PathBuf::from("/sys/fs/cgroup/docker/abc123"),
            ]
        );
    }

    #[test]
    fn test_primary_files_per_version() {
        assert_eq!(
            CgroupVersion::V1.counter_files(Domain::Cpu)[0].name,
            "cpuacct.stat"
        );
        assert_eq!(CgroupVersion::V2.counter_files(Domain::Cpu)[0].name, "cpu.stat");
        assert_eq!(
            CgroupVersion::V2.counter_files(Domain::Memory)[0].name,
            "memory.stat"
        );
    }

    #[test]
    fn test_extract_id_from_scope() {
        let scope = format!("docker-{ID}.scope");
        assert_eq!(
            Naming::SystemdScope.extract_id(&scope).unwrap().as_ref(),
            ID
        );
        assert!(Naming::SystemdScope.extract_id(ID).is_none());
        assert!(Naming::SystemdScope.extract_id("docker-invalid.scope").is_none());
        assert!(
            Naming::SystemdScope
                .extract_id(&format!("libpod-{ID}.scope"))
                .is_none()
        );
    }

    #[test]
    fn test_extract_bare_id() {
        assert!(Naming::Bare.extract_id(ID).is_some());
        assert!(Naming::Bare.extract_id("abc123").is_none());
    }
}
