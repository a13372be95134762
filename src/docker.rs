//! Per-container CPU and memory accounting for Docker.
//!
//! [`CgroupAccounting`] is the entry point of the library. It owns the [`PathResolver`] and with
//! it the cached cgroup hierarchy, so one instance should be shared (by reference or in an
//! `Arc`) by every caller of a process.
//!
//! # Example
//!
//! ```no_run
//! use cgstat::{CgroupAccounting, QueryContext};
//!
//! let accounting = CgroupAccounting::from_env();
//! let ctx = QueryContext::background();
//! for id in accounting.get_docker_id_list(&ctx)? {
//!     let cpu = accounting.cgroup_cpu_docker(&ctx, id.as_ref())?;
//!     println!("{id}: {}", cpu.summary);
//! }
//! # Ok::<(), cgstat::Error>(())
//! ```

use crate::cgroup::stats::{
    CgroupCpuDockerStat, CgroupDockerStat, CgroupMemStat, normalize_cpu, normalize_memory,
};
use crate::cgroup::{
    CgroupVersion, Domain, Hierarchy, PathResolver, RawCounters, ResolvedPath,
    list_container_ids, read_counters_into,
};
use crate::config::Config;
use crate::container::ContainerID;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::host::{CpuSnapshotSource, ProcStat};
use crate::times::CpuTimes;

/// Queries container resource usage from the cgroup filesystem.
///
/// Every query reads the kernel's counters afresh; nothing but the hierarchy layout is cached.
#[derive(Debug)]
pub struct CgroupAccounting {
    resolver: PathResolver,
}

impl CgroupAccounting {
    pub fn new(config: Config) -> Self {
        Self {
            resolver: PathResolver::new(config),
        }
    }

    /// Creates an instance configured by [`Config::from_env`].
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Creates an instance for a known hierarchy, skipping the probe.
    pub fn with_hierarchy(config: Config, hierarchy: Hierarchy) -> Self {
        Self {
            resolver: PathResolver::with_hierarchy(config, hierarchy),
        }
    }

    pub fn config(&self) -> &Config {
        self.resolver.config()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Forgets the probed hierarchy, e.g. after the host's cgroup mounts changed.
    pub fn reset(&self) {
        self.resolver.reset();
    }

    /// The cgroup version of the host, probing it on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled.
    /// - [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    pub fn cgroup_version(&self, ctx: &QueryContext) -> Result<CgroupVersion> {
        ctx.check()?;
        Ok(self.resolver.hierarchy(ctx)?.version())
    }

    /// Lists the ids of all running containers, sorted and without duplicates.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled.
    /// - [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    /// - [`Error::RuntimeUnavailable`] if the runtime's parent cgroup cannot be read.
    pub fn get_docker_id_list(&self, ctx: &QueryContext) -> Result<Vec<ContainerID>> {
        ctx.check()?;
        let hierarchy = self.resolver.hierarchy(ctx)?;
        let ids = list_container_ids(ctx, &hierarchy, &self.config().cgroup_parent)?;
        log::debug!("found {} containers", ids.len());
        Ok(ids.into_iter().collect())
    }

    /// CPU times of container `id` in seconds.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled between I/O steps.
    /// - [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    /// - [`Error::ContainerNotFound`] if `id` has no CPU cgroup.
    /// - [`Error::AccountingFileUnavailable`] if `cpu.stat`/`cpuacct.stat` cannot be read.
    /// - [`Error::IncompleteAccountingData`] if user or system time is missing.
    pub fn cgroup_cpu_docker(&self, ctx: &QueryContext, id: &str) -> Result<CgroupCpuDockerStat> {
        let id = container_id(id, Domain::Cpu)?;
        let (version, counters) = self.read_domain(ctx, &id, Domain::Cpu)?;
        normalize_cpu(&id, version, &counters, self.config().clock_ticks)
    }

    /// Cumulative CPU usage of container `id` in seconds.
    ///
    /// # Errors
    ///
    /// See [`CgroupAccounting::cgroup_cpu_docker`].
    pub fn cgroup_cpu_usage_docker(&self, ctx: &QueryContext, id: &str) -> Result<f64> {
        self.cgroup_cpu_docker(ctx, id).map(|stat| stat.usage)
    }

    /// Memory usage and limits of container `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled between I/O steps.
    /// - [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    /// - [`Error::ContainerNotFound`] if `id` has no memory cgroup.
    /// - [`Error::AccountingFileUnavailable`] if `memory.stat` or the usage or limit file cannot
    ///   be read.
    /// - [`Error::IncompleteAccountingData`] if usage, limit, or cache is missing.
    pub fn cgroup_mem_docker(&self, ctx: &QueryContext, id: &str) -> Result<CgroupMemStat> {
        let id = container_id(id, Domain::Memory)?;
        let (version, counters) = self.read_domain(ctx, &id, Domain::Memory)?;
        normalize_memory(&id, version, &counters, self.config().page_size)
    }

    /// Raw CPU counters of every running container.
    ///
    /// # Errors
    ///
    /// Fails like [`CgroupAccounting::get_docker_id_list`], or with the first error of a
    /// container, including one that exited between listing and reading.
    pub fn docker_stats(&self, ctx: &QueryContext) -> Result<Vec<CgroupDockerStat>> {
        self.get_docker_id_list(ctx)?
            .into_iter()
            .map(|id| {
                let (version, counters) = self.read_domain(ctx, &id, Domain::Cpu)?;
                CgroupDockerStat::from_counters(id, version, &counters)
            })
            .collect()
    }

    /// Cumulative CPU times of the host.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled.
    /// - [`Error::HostCpuUnavailable`] if `/proc/stat` cannot be read.
    pub fn host_cpu_times(&self, ctx: &QueryContext, per_cpu: bool) -> Result<Vec<CpuTimes>> {
        ctx.check()?;
        ProcStat::from_config(self.config()).cpu_times(per_cpu)
    }

    /// Resolves the cgroup of `id` and reads every accounting file of `domain`.
    fn read_domain(
        &self,
        ctx: &QueryContext,
        id: &ContainerID,
        domain: Domain,
    ) -> Result<(CgroupVersion, RawCounters)> {
        let resolved = self.resolver.resolve_path(ctx, id, domain)?;
        read_accounting_files(ctx, id, &resolved)
    }
}

/// Reads the accounting files of a resolved cgroup. `ctx` is checked before every file.
///
/// Optional files that cannot be read are skipped.
fn read_accounting_files(
    ctx: &QueryContext,
    id: &ContainerID,
    resolved: &ResolvedPath,
) -> Result<(CgroupVersion, RawCounters)> {
    let mut counters = RawCounters::new();
    for (file, path) in resolved.files() {
        ctx.check()?;
        match read_counters_into(&mut counters, &path, file.format) {
            Ok(()) => {}
            Err(err) if file.required => {
                return Err(Error::AccountingFileUnavailable {
                    id: id.to_string(),
                    domain: resolved.domain,
                    path: err.path,
                    source: err.source,
                });
            }
            Err(err) => log::trace!("skipping optional accounting file: {err}"),
        }
    }
    Ok((resolved.version, counters))
}

/// Ids that cannot name a cgroup directory are reported as not found.
fn container_id(id: &str, domain: Domain) -> Result<ContainerID> {
    ContainerID::new(id).map_err(|err| {
        log::debug!("rejecting container id: {err}");
        Error::ContainerNotFound {
            id: id.to_owned(),
            domain,
            path: None,
        }
    })
}
