//! Resource metrics for hostkeeper
//!
//! Provides:
//! - CPU usage sampling and top CPU consumers (alert diagnostics)
//! - Disk usage for a mount point (via `df`)
//! - A full system snapshot for the on-demand "system info" view

use crate::backends::ResourceSampler;
use crate::error::{MonitorError, MonitorResult};
use crate::execution::CommandExecutor;
use crate::models::ProcessEntry;
use async_trait::async_trait;
use serde::Serialize;
use sysinfo::System;
use tracing::debug;

/// System snapshot returned by `GET /system`
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub uptime_seconds: u64,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: Vec<DiskMetrics>,
}

/// CPU usage metrics
#[derive(Debug, Serialize)]
pub struct CpuMetrics {
    pub percent: f32,
    pub load_avg: [f64; 3],  // [1min, 5min, 15min]
    pub core_count: usize,
}

/// Memory usage metrics
#[derive(Debug, Serialize)]
pub struct MemoryMetrics {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
    pub percent_used: f32,
}

/// Disk usage for one mount point
#[derive(Debug, Serialize)]
pub struct DiskMetrics {
    pub path: String,
    pub percent_used: Option<f32>,
}

impl SystemMetrics {
    /// Collect a full snapshot; disk usage comes from the given sampler
    pub async fn collect(sampler: &dyn ResourceSampler, mounts: &[String]) -> Self {
        debug!("Collecting system metrics...");

        let mut sys = System::new_all();
        sys.refresh_all();

        // Wait a moment for accurate CPU readings
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();

        let mut disk = Vec::with_capacity(mounts.len());
        for mount in mounts {
            disk.push(DiskMetrics {
                path: mount.clone(),
                percent_used: sampler.disk_percent(mount).await.ok(),
            });
        }

        SystemMetrics {
            uptime_seconds: System::uptime(),
            cpu: CpuMetrics::collect(&sys),
            memory: MemoryMetrics::collect(&sys),
            disk,
        }
    }
}

impl CpuMetrics {
    fn collect(sys: &System) -> Self {
        let load = System::load_average();
        CpuMetrics {
            percent: sys.global_cpu_info().cpu_usage(),
            load_avg: [load.one, load.five, load.fifteen],
            core_count: sys.cpus().len(),
        }
    }
}

impl MemoryMetrics {
    fn collect(sys: &System) -> Self {
        let total_bytes = sys.total_memory();
        let available_bytes = sys.available_memory();
        let used_bytes = total_bytes.saturating_sub(available_bytes);

        let percent_used = if total_bytes > 0 {
            (used_bytes as f32 / total_bytes as f32) * 100.0
        } else {
            0.0
        };

        MemoryMetrics {
            total_mb: total_bytes / (1024 * 1024),
            used_mb: used_bytes / (1024 * 1024),
            available_mb: available_bytes / (1024 * 1024),
            percent_used,
        }
    }
}

/// Real resource sampler: sysinfo for CPU and processes, `df` for disks
pub struct SystemSampler {
    executor: CommandExecutor,
}

impl SystemSampler {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ResourceSampler for SystemSampler {
    async fn cpu_percent(&self) -> MonitorResult<f32> {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();

        let percent = sys.global_cpu_info().cpu_usage();
        debug!("CPU usage: {:.1}%", percent);
        Ok(percent)
    }

    async fn disk_percent(&self, mount: &str) -> MonitorResult<f32> {
        let result = self
            .executor
            .run("df", &["--output=pcent", mount])
            .await
            .map_err(|e| probe_error(mount, format!("{:#}", e)))?;

        if !result.success {
            return Err(probe_error(mount, result.combined_output().trim().to_string()));
        }

        let percent = parse_df_percent(&result.stdout)
            .ok_or_else(|| probe_error(mount, format!("unparseable df output: {:?}", result.stdout)))?;
        debug!("Storage usage on {}: {}%", mount, percent);
        Ok(percent)
    }

    async fn top_cpu_consumers(&self, limit: usize) -> MonitorResult<Vec<ProcessEntry>> {
        // process CPU usage needs two refreshes to have a delta
        let mut sys = System::new();
        sys.refresh_processes();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_processes();

        let mut processes: Vec<_> = sys.processes().values().collect();
        processes.sort_by(|a, b| {
            b.cpu_usage()
                .partial_cmp(&a.cpu_usage())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(processes
            .into_iter()
            .take(limit)
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu_percent: p.cpu_usage(),
                memory_mb: p.memory() as f64 / (1024.0 * 1024.0),
            })
            .collect())
    }
}

fn probe_error(mount: &str, reason: String) -> MonitorError {
    MonitorError::ProbeExecution {
        entity: format!("disk:{}", mount),
        reason,
    }
}

/// Parse `df --output=pcent <mount>`
///
/// ```text
/// Use%
///  42%
/// ```
pub fn parse_df_percent(stdout: &str) -> Option<f32> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.trim_end_matches('%').trim().parse::<f32>().ok())
}

/// Render top consumers the way `ps -eo pid,%cpu,%mem,comm` lays them out
pub fn format_process_table(processes: &[ProcessEntry]) -> String {
    let mut table = format!("{:>7} {:>6} {:>9}  {}\n", "PID", "%CPU", "MEM(MB)", "COMMAND");
    for p in processes {
        table.push_str(&format!(
            "{:>7} {:>6.1} {:>9.1}  {}\n",
            p.pid, p.cpu_percent, p.memory_mb, p.name
        ));
    }
    table
}
