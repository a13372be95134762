use serde::Serialize;

/// CPU time breakdown in seconds.
///
/// Shared by host CPU snapshots (one record per `cpu`/`cpuN` line) and container statistics
/// (labelled with the container id). Fields a source does not account for stay `0.0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CpuTimes {
    /// Label of the accounted entity, e.g. `cpu-total`, `cpu0`, or a container id.
    pub cpu: String,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub nice: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl CpuTimes {
    /// Creates a record with only a label set.
    pub fn labelled(cpu: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            ..Self::default()
        }
    }

    /// Sum of all accounted states, excluding `guest` and `guest_nice` which the kernel already
    /// counts in `user` and `nice`.
    pub fn total(&self) -> f64 {
        self.user
            + self.system
            + self.idle
            + self.nice
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}
