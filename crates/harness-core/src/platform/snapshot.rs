//! Host load/cpu/memory/disk snapshot written into `system.log` before the
//! agent cell starts, so operators can correlate slow instances with host
//! contention after the fact.

use serde::Serialize;
use sysinfo::{Disks, System};

/// One point-in-time resource snapshot of the harness host.
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    pub cpu_count: usize,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub disk_available_bytes: u64,
    pub disk_total_bytes: u64,
}

impl HostSnapshot {
    /// Capture the current host state. Cheap enough to call once per
    /// instance immediately before the agent cell starts.
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let load = System::load_average();
        let disks = Disks::new_with_refreshed_list();
        let (disk_available, disk_total) = disks
            .iter()
            .map(|d| (d.available_space(), d.total_space()))
            .fold((0u64, 0u64), |(a_sum, t_sum), (a, t)| (a_sum + a, t_sum + t));

        Self {
            load_avg_1: load.one,
            load_avg_5: load.five,
            load_avg_15: load.fifteen,
            cpu_count: sys.cpus().len(),
            mem_used_bytes: sys.used_memory(),
            mem_total_bytes: sys.total_memory(),
            disk_available_bytes: disk_available,
            disk_total_bytes: disk_total,
        }
    }
}
