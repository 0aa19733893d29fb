//! Host telemetry backed by `sysinfo`.
//!
//! sysinfo calls are blocking (and CPU sampling sleeps between two
//! refreshes), so every query runs on the blocking pool.

use std::path::Path;

use async_trait::async_trait;
use sysinfo::{Disks, Networks, System};

use termbot_core::telemetry::{
    DiskInfo, MemoryReport, NetworkInterface, ProcessInfo, SystemStatus, Usage,
};
use termbot_core::{Telemetry, TelemetryError};

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoTelemetry;

impl SysinfoTelemetry {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(f: F) -> Result<T, TelemetryError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TelemetryError::Unavailable(e.to_string()))
}

fn usage(total: u64, free: u64) -> Usage {
    Usage {
        total_bytes: total,
        used_bytes: total.saturating_sub(free),
        free_bytes: free,
    }
}

fn memory_report(sys: &System) -> MemoryReport {
    MemoryReport {
        ram: Usage {
            total_bytes: sys.total_memory(),
            used_bytes: sys.used_memory(),
            free_bytes: sys.total_memory().saturating_sub(sys.used_memory()),
        },
        swap: Usage {
            total_bytes: sys.total_swap(),
            used_bytes: sys.used_swap(),
            free_bytes: sys.free_swap(),
        },
    }
}

fn collect_disks() -> Vec<DiskInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| DiskInfo {
            mount_point: disk.mount_point().display().to_string(),
            file_system: disk.file_system().to_string_lossy().into_owned(),
            usage: usage(disk.total_space(), disk.available_space()),
        })
        .collect()
}

fn collect_status() -> SystemStatus {
    let mut sys = System::new();
    sys.refresh_cpu();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpus = sys.cpus();
    let (cpu_brand, cpu_frequency_mhz) = cpus
        .first()
        .map(|cpu| (cpu.brand().trim().to_string(), cpu.frequency()))
        .unwrap_or_default();

    let disk_root = collect_disks()
        .into_iter()
        .find(|disk| Path::new(&disk.mount_point) == Path::new("/"))
        .map(|disk| disk.usage);

    SystemStatus {
        os_name: System::name().unwrap_or_default(),
        os_version: System::os_version().unwrap_or_default(),
        kernel_version: System::kernel_version().unwrap_or_default(),
        host_name: System::host_name().unwrap_or_default(),
        arch: std::env::consts::ARCH.to_string(),
        uptime_secs: System::uptime(),
        cpu_brand,
        cpu_cores: cpus.len(),
        cpu_frequency_mhz,
        cpu_usage_percent: sys.global_cpu_info().cpu_usage(),
        memory: memory_report(&sys).ram,
        disk_root,
    }
}

fn collect_networks() -> Vec<NetworkInterface> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<NetworkInterface> = networks
        .iter()
        .map(|(name, data)| NetworkInterface {
            name: name.clone(),
            mac_address: data.mac_address().to_string(),
            received_bytes: data.total_received(),
            transmitted_bytes: data.total_transmitted(),
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

fn collect_processes(limit: usize) -> Vec<ProcessInfo> {
    let mut sys = System::new();
    // CPU usage is a delta between two samples.
    sys.refresh_processes();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_processes();

    let mut processes: Vec<ProcessInfo> = sys
        .processes()
        .iter()
        .map(|(pid, process)| ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
        })
        .collect();
    processes.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then(b.memory_bytes.cmp(&a.memory_bytes))
    });
    processes.truncate(limit);
    processes
}

#[async_trait]
impl Telemetry for SysinfoTelemetry {
    async fn system_status(&self) -> Result<SystemStatus, TelemetryError> {
        blocking(collect_status).await
    }

    async fn memory(&self) -> Result<MemoryReport, TelemetryError> {
        blocking(|| {
            let mut sys = System::new();
            sys.refresh_memory();
            memory_report(&sys)
        })
        .await
    }

    async fn disks(&self) -> Result<Vec<DiskInfo>, TelemetryError> {
        blocking(collect_disks).await
    }

    async fn networks(&self) -> Result<Vec<NetworkInterface>, TelemetryError> {
        blocking(collect_networks).await
    }

    async fn top_processes(&self, limit: usize) -> Result<Vec<ProcessInfo>, TelemetryError> {
        blocking(move || collect_processes(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_from_total_and_free() {
        let u = usage(100, 30);
        assert_eq!(u.used_bytes, 70);
        assert_eq!(u.free_bytes, 30);
        assert_eq!(usage(10, 20).used_bytes, 0);
    }

    #[tokio::test]
    async fn test_system_status_reports_host() {
        let status = SysinfoTelemetry::new().system_status().await.unwrap();
        assert_eq!(status.arch, std::env::consts::ARCH);
        assert!(status.cpu_cores > 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_memory_is_nonzero() {
        let report = SysinfoTelemetry::new().memory().await.unwrap();
        assert!(report.ram.total_bytes > 0);
        assert!(report.ram.used_bytes <= report.ram.total_bytes);
    }

    #[tokio::test]
    async fn test_top_processes_respects_limit_and_order() {
        let processes = SysinfoTelemetry::new().top_processes(3).await.unwrap();
        assert!(processes.len() <= 3);
        for pair in processes.windows(2) {
            assert!(pair[0].cpu_percent >= pair[1].cpu_percent);
        }
    }
}
