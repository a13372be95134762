use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Config;
use crate::container::ContainerID;
use crate::context::QueryContext;
use crate::error::{Error, Result};

use super::{CgroupVersion, CounterFile, Domain, Hierarchy};

/// The accounting files of one container and domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub version: CgroupVersion,
    pub domain: Domain,
    /// The container's cgroup directory.
    pub dir: PathBuf,
}

impl ResolvedPath {
    /// Path of the domain's primary counter file (`cpu.stat`, `cpuacct.stat`, `memory.stat`).
    pub fn stat_file(&self) -> PathBuf {
        self.dir.join(self.counter_files()[0].name)
    }

    pub fn counter_files(&self) -> &'static [CounterFile] {
        self.version.counter_files(self.domain)
    }

    /// Every accounting file of the domain together with its full path.
    pub fn files(&self) -> impl Iterator<Item = (&'static CounterFile, PathBuf)> + '_ {
        self.counter_files()
            .iter()
            .map(|file| (file, self.dir.join(file.name)))
    }
}

/// Maps container ids to their cgroup accounting files.
///
/// The hierarchy is probed on first use and cached until [`PathResolver::reset`]. Concurrent
/// first callers serialize on the cache lock, so the probe runs once.
#[derive(Debug)]
pub struct PathResolver {
    config: Config,
    hierarchy: RwLock<Option<Arc<Hierarchy>>>,
}

impl PathResolver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            hierarchy: RwLock::new(None),
        }
    }

    /// Creates a resolver with an already known hierarchy. No probe is performed.
    pub fn with_hierarchy(config: Config, hierarchy: Hierarchy) -> Self {
        Self {
            config,
            hierarchy: RwLock::new(Some(Arc::new(hierarchy))),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the cached hierarchy, probing it first if necessary.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled before probing.
    /// - [`Error::UnsupportedCgroupVersion`] if no layout is detected.
    pub fn hierarchy(&self, ctx: &QueryContext) -> Result<Arc<Hierarchy>> {
        if let Some(hierarchy) = self.cached() {
            return Ok(hierarchy);
        }

        let mut slot = self
            .hierarchy
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hierarchy) = slot.as_ref() {
            return Ok(Arc::clone(hierarchy));
        }
        ctx.check()?;
        let hierarchy = Arc::new(Hierarchy::probe(&self.config)?);
        log::debug!("detected cgroup hierarchy: {hierarchy:?}");
        *slot = Some(Arc::clone(&hierarchy));
        Ok(hierarchy)
    }

    /// The cached version, without probing.
    pub fn cached_version(&self) -> Option<CgroupVersion> {
        self.cached().map(|hierarchy| hierarchy.version())
    }

    /// Drops the cached hierarchy. The next query probes again.
    pub fn reset(&self) {
        *self
            .hierarchy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn cached(&self) -> Option<Arc<Hierarchy>> {
        self.hierarchy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Locates the cgroup directory of container `id` for `domain`.
    ///
    /// The id is not validated beyond path safety; a directory that does not exist is what makes
    /// an id unknown.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `ctx` is cancelled between I/O steps.
    /// - [`Error::UnsupportedCgroupVersion`] if the hierarchy cannot be probed.
    /// - [`Error::ContainerNotFound`] if no candidate directory exists.
    pub fn resolve_path(
        &self,
        ctx: &QueryContext,
        id: &ContainerID,
        domain: Domain,
    ) -> Result<ResolvedPath> {
        ctx.check()?;
        let hierarchy = self.hierarchy(ctx)?;
        let candidates = hierarchy.container_dirs(domain, &self.config.cgroup_parent, id);

        for dir in &candidates {
            ctx.check()?;
            if dir.is_dir() {
                log::debug!("resolved {domain} cgroup of `{id}`: {}", dir.display());
                return Ok(ResolvedPath {
                    version: hierarchy.version(),
                    domain,
                    dir: dir.clone(),
                });
            }
        }

        Err(Error::ContainerNotFound {
            id: id.to_string(),
            domain,
            path: candidates.into_iter().next(),
        })
    }
}
