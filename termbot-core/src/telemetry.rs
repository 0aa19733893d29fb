//! Host telemetry collaborator and the snapshot types it returns.
//!
//! All sizes are bytes. Formatting for display lives in [`crate::format`].

use async_trait::async_trait;

use crate::error::TelemetryError;

/// Total/used/free triple for memory, swap or a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Usage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl Usage {
    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 * 100.0 / self.total_bytes as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemStatus {
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub host_name: String,
    pub arch: String,
    pub uptime_secs: u64,
    pub cpu_brand: String,
    pub cpu_cores: usize,
    pub cpu_frequency_mhz: u64,
    pub cpu_usage_percent: f32,
    pub memory: Usage,
    pub disk_root: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemoryReport {
    pub ram: Usage,
    pub swap: Usage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskInfo {
    pub mount_point: String,
    pub file_system: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInterface {
    pub name: String,
    pub mac_address: String,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// Source of host resource snapshots. Only invoked for authorized requests.
#[async_trait]
pub trait Telemetry: Send + Sync {
    async fn system_status(&self) -> Result<SystemStatus, TelemetryError>;

    async fn memory(&self) -> Result<MemoryReport, TelemetryError>;

    async fn disks(&self) -> Result<Vec<DiskInfo>, TelemetryError>;

    async fn networks(&self) -> Result<Vec<NetworkInterface>, TelemetryError>;

    /// The `limit` processes using the most CPU, highest first.
    async fn top_processes(&self, limit: usize) -> Result<Vec<ProcessInfo>, TelemetryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_used() {
        let usage = Usage {
            total_bytes: 200,
            used_bytes: 50,
            free_bytes: 150,
        };
        assert!((usage.percent_used() - 25.0).abs() < f64::EPSILON);
        assert_eq!(Usage::default().percent_used(), 0.0);
    }
}
