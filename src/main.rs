use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;

use cgstat::cgroup::CgroupVersion;
use cgstat::cgroup::stats::{CgroupCpuDockerStat, CgroupMemStat};
use cgstat::error::ResultOkLogExt;
use cgstat::times::CpuTimes;
use cgstat::{CgroupAccounting, Config, QueryContext};

/// Prints a JSON snapshot of the CPU and memory usage of running Docker containers.
///
/// Counters are read from the cgroup filesystem. Run on the host, or in a container with the
/// host's root filesystem mounted at `ROOTFS_MOUNT_PATH` (default `/rootfs`).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug cgstat --host-cpu
/// cgstat --id 4f1c... --id 9ab2... --timeout-ms 500
/// ```
#[derive(Parser, Debug)]
#[command(name = "cgstat")]
#[command(version)]
struct Cli {
    /// Container to report. May be repeated; defaults to every running container.
    #[arg(long = "id")]
    ids: Vec<String>,
    /// Root of the host filesystem. Overrides detection via `ROOTFS_MOUNT_PATH`.
    #[arg(long)]
    rootfs: Option<PathBuf>,
    /// Cgroup root to probe instead of consulting the mount table.
    #[arg(long)]
    cgroup_root: Option<PathBuf>,
    /// Parent cgroup of containers.
    #[arg(long)]
    cgroup_parent: Option<String>,
    /// Include host CPU times.
    #[arg(long)]
    host_cpu: bool,
    /// Report host CPU times per logical CPU. Implies `--host-cpu`.
    #[arg(long)]
    per_cpu: bool,
    /// Abort the snapshot after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = match &self.rootfs {
            Some(rootfs) => Config::with_rootfs(rootfs),
            None => Config::from_env(),
        };
        if let Some(root) = &self.cgroup_root {
            config.cgroup_root = Some(root.clone());
        }
        if let Some(parent) = &self.cgroup_parent {
            config.cgroup_parent = parent.clone();
        }
        config
    }
}

#[derive(Debug, Serialize)]
struct Snapshot {
    cgroup_version: CgroupVersion,
    containers: Vec<ContainerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_cpu: Option<Vec<CpuTimes>>,
}

#[derive(Debug, Serialize)]
struct ContainerSnapshot {
    id: String,
    cpu: Option<CgroupCpuDockerStat>,
    memory: Option<CgroupMemStat>,
}

/// Collects one snapshot. Failures of single containers are logged and reported as `null`.
fn collect(
    accounting: &CgroupAccounting,
    ctx: &QueryContext,
    ids: Vec<String>,
    host_cpu: Option<bool>,
) -> cgstat::Result<Snapshot> {
    let cgroup_version = accounting.cgroup_version(ctx)?;
    let ids = if ids.is_empty() {
        accounting
            .get_docker_id_list(ctx)?
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    } else {
        ids
    };

    let mut containers = Vec::with_capacity(ids.len());
    for id in ids {
        ctx.check()?;
        containers.push(ContainerSnapshot {
            cpu: accounting.cgroup_cpu_docker(ctx, &id).ok_log(),
            memory: accounting.cgroup_mem_docker(ctx, &id).ok_log(),
            id,
        });
    }
    ctx.check()?;

    let host_cpu = host_cpu.and_then(|per_cpu| accounting.host_cpu_times(ctx, per_cpu).ok_log());
    Ok(Snapshot {
        cgroup_version,
        containers,
        host_cpu,
    })
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let accounting = CgroupAccounting::new(cli.config());
    let (mut ctx, canceller) = QueryContext::cancellable();
    if let Some(timeout_ms) = cli.timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(timeout_ms));
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("received Ctrl-C, cancelling snapshot");
                canceller.cancel();
            }
            Err(err) => log::error!("failed to listen for Ctrl-C: {err}"),
        }
    });

    let host_cpu = (cli.host_cpu || cli.per_cpu).then_some(cli.per_cpu);
    let snapshot = tokio::task::spawn_blocking(move || {
        let before = std::time::Instant::now();
        let snapshot = collect(&accounting, &ctx, cli.ids, host_cpu);
        log::debug!("snapshot took {} microseconds", before.elapsed().as_micros());
        snapshot
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
