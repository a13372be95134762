use std::path::{Path, PathBuf};

use crate::cgroup::Domain;

/// Errors surfaced by the public query operations.
///
/// Every variant carries enough context (container id, accounting domain, path attempted) to be
/// actionable on its own. Nothing is retried internally: a container that disappears mid-read
/// is a terminal failure for that call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container runtime unavailable: failed to read discovery root `{path}`: {source}")]
    RuntimeUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container `{id}` not found in the {domain} hierarchy{}", attempted(.path.as_deref()))]
    ContainerNotFound {
        id: String,
        domain: Domain,
        path: Option<PathBuf>,
    },
    #[error("no supported cgroup layout detected below `{root}`")]
    UnsupportedCgroupVersion { root: PathBuf },
    #[error("failed to read {domain} accounting file `{path}` of container `{id}`: {source}")]
    AccountingFileUnavailable {
        id: String,
        domain: Domain,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("incomplete {domain} accounting data for container `{id}`: missing key `{key}`")]
    IncompleteAccountingData {
        id: String,
        domain: Domain,
        key: &'static str,
    },
    #[error("query cancelled")]
    Cancelled,
    #[error("failed to read host cpu times from `{path}`: {source}")]
    HostCpuUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn attempted(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!(" (tried `{}`)", path.display()),
        None => String::new(),
    }
}

pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }
}
