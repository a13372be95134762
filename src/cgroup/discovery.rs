use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;

use crate::container::ContainerID;
use crate::context::QueryContext;
use crate::error::{Error, Result};

use super::Hierarchy;
use super::hierarchy::Naming;

/// Lists the containers that currently own a cgroup below the runtime's discovery roots.
///
/// - v1: `<cpuacct mount>/<parent>/<id>`
/// - v2: `<unified>/system.slice/docker-<id>.scope` and `<unified>/<parent>/<id>`
///
/// Entries that are not directories or not named like a full Docker id are skipped.
///
/// # Errors
///
/// - [`Error::Cancelled`] if `ctx` is cancelled before a root is read.
/// - [`Error::RuntimeUnavailable`] if none of the discovery roots can be opened, i.e. the runtime
///   never created its parent cgroup, or if listing an opened root fails part way. Zero running
///   containers is an empty set, not an error.
pub fn list_container_ids(
    ctx: &QueryContext,
    hierarchy: &Hierarchy,
    parent: &str,
) -> Result<BTreeSet<ContainerID>> {
    let mut ids = BTreeSet::new();
    let mut readable = false;
    let mut last_failure = None;

    for (root, naming) in hierarchy.discovery_roots(parent) {
        ctx.check()?;
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(source) => {
                log::debug!("skipping discovery root `{}`: {source}", root.display());
                last_failure = Some(Error::RuntimeUnavailable { path: root, source });
                continue;
            }
        };
        readable = true;

        let entries = entries.map(|entry| -> std::io::Result<(OsString, bool)> {
            let entry = entry?;
            Ok((entry.file_name(), entry.file_type()?.is_dir()))
        });
        collect_ids(&root, naming, entries, &mut ids)?;
    }

    match (readable, last_failure) {
        (false, Some(err)) => Err(err),
        _ => Ok(ids),
    }
}

/// Adds the ids named by the directory entries of `root` to `ids`.
fn collect_ids(
    root: &Path,
    naming: Naming,
    entries: impl IntoIterator<Item = std::io::Result<(OsString, bool)>>,
    ids: &mut BTreeSet<ContainerID>,
) -> Result<()> {
    for entry in entries {
        let (file_name, is_dir) = entry.map_err(|source| Error::RuntimeUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        if !is_dir {
            continue;
        }
        if let Some(id) = file_name.to_str().and_then(|name| naming.extract_id(name)) {
            log::trace!("discovered container `{id}` in `{}`", root.display());
            ids.insert(id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    const ID_B: &str = "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210";

    fn v1(root: &Path) -> Hierarchy {
        Hierarchy::V1 {
            cpuacct: root.join("cpuacct"),
            memory: root.join("memory"),
        }
    }

    #[test]
    fn test_list_v1_containers() {
        let root = tempfile::tempdir().unwrap();
        let parent = root.path().join("cpuacct/docker");
        std::fs::create_dir_all(parent.join(ID_B)).unwrap();
        std::fs::create_dir_all(parent.join(ID_A)).unwrap();
        std::fs::create_dir_all(parent.join("not-a-container")).unwrap();
        std::fs::write(parent.join("cpuacct.stat"), "user 1\nsystem 1\n").unwrap();

        let ids = list_container_ids(&QueryContext::background(), &v1(root.path()), "docker")
            .unwrap();
        let ids: Vec<_> = ids.iter().map(|id| id.as_ref()).collect();
        assert_eq!(ids, vec![ID_A, ID_B]);
    }

    #[test]
    fn test_list_v2_containers_from_both_drivers() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(format!("system.slice/docker-{ID_A}.scope")))
            .unwrap();
        std::fs::create_dir_all(root.path().join("system.slice/sshd.service")).unwrap();
        std::fs::create_dir_all(root.path().join("docker").join(ID_B)).unwrap();
        let hierarchy = Hierarchy::V2 {
            unified: root.path().to_path_buf(),
        };

        let ids = list_container_ids(&QueryContext::background(), &hierarchy, "docker").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(ID_A));
        assert!(ids.contains(ID_B));
    }

    #[test]
    fn test_no_containers_is_empty() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("cpuacct/docker")).unwrap();

        let ids = list_container_ids(&QueryContext::background(), &v1(root.path()), "docker")
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_missing_runtime_parent_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("cpuacct")).unwrap();

        let err = list_container_ids(&QueryContext::background(), &v1(root.path()), "docker")
            .unwrap_err();
        match err {
            Error::RuntimeUnavailable { path, source } => {
                assert_eq!(path, root.path().join("cpuacct/docker"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_entry_aborts_listing() {
        let root = Path::new("/sys/fs/cgroup/cpuacct/docker");
        let entries = vec![
            Ok((OsString::from(ID_A), true)),
            Err(std::io::Error::from_raw_os_error(libc::EIO)),
            Ok((OsString::from(ID_B), true)),
        ];
        let mut ids = BTreeSet::new();

        let err = collect_ids(root, Naming::Bare, entries, &mut ids).unwrap_err();
        match err {
            Error::RuntimeUnavailable { path, source } => {
                assert_eq!(path, root);
                assert_eq!(source.raw_os_error(), Some(libc::EIO));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_collect_ids_skips_files_and_foreign_names() {
        let entries = vec![
            Ok((OsString::from(ID_A), false)),
            Ok((OsString::from("cgroup.procs"), false)),
            Ok((OsString::from("init.scope"), true)),
            Ok((OsString::from(ID_B), true)),
        ];
        let mut ids = BTreeSet::new();

        collect_ids(Path::new("/docker"), Naming::Bare, entries, &mut ids).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(ID_B));
    }

    #[test]
    fn test_cancelled_listing() {
        let root = tempfile::tempdir().unwrap();
        let (ctx, canceller) = QueryContext::cancellable();
        canceller.cancel();

        let err = list_container_ids(&ctx, &v1(root.path()), "docker").unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
