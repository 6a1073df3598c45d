//! 主机指标来源
//!
//! `MetricsProvider` 返回原始读数（百分比、累计字节数），速率换算由采集器完成。
//! 默认实现基于 sysinfo。

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System,
    MINIMUM_CPU_UPDATE_INTERVAL,
};
use thiserror::Error;
use tokio::sync::Mutex;

/// 指标读取错误
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 指标来源当前不可用
    #[error("metric source unavailable: {0}")]
    Unavailable(String),
    /// 挂载点不存在
    #[error("mount not found: {0}")]
    MountNotFound(String),
    /// 读取超时
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// 阻塞读取任务失败
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// 单个挂载点的容量
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// 单个设备的累计读写字节数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// 所有网卡累计收发字节数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetIoCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// 主机指标来源
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// 全局 CPU 使用率（0-100）
    async fn cpu_percent(&self) -> Result<f64, ProviderError>;

    /// 内存使用率（0-100）
    async fn memory_used_percent(&self) -> Result<f64, ProviderError>;

    /// 所有挂载点
    async fn disk_partitions(&self) -> Result<Vec<String>, ProviderError>;

    /// 指定挂载点的容量
    async fn disk_usage(&self, mount: &str) -> Result<DiskUsage, ProviderError>;

    /// 每个块设备的累计读写字节数
    async fn disk_io_counters(&self) -> Result<Vec<DiskIoCounters>, ProviderError>;

    /// 汇总的网络累计收发字节数
    async fn net_io_counters(&self) -> Result<NetIoCounters, ProviderError>;
}

/// 基于 sysinfo 的指标来源
pub struct SysinfoProvider {
    /// CPU 使用率需要两次刷新之间的差值，因此保留同一个 System 实例
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn cpu_percent(&self) -> Result<f64, ProviderError> {
        let mut sys = self.system.lock().await;

        // 需要等待一小段时间让 CPU 使用率计算准确
        sys.refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();

        if sys.cpus().is_empty() {
            return Err(ProviderError::Unavailable("no cpu reported".to_string()));
        }
        Ok(f64::from(sys.global_cpu_usage()))
    }

    async fn memory_used_percent(&self) -> Result<f64, ProviderError> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(ProviderError::Unavailable("total memory is zero".to_string()));
        }
        Ok(sys.used_memory() as f64 / total as f64 * 100.0)
    }

    async fn disk_partitions(&self) -> Result<Vec<String>, ProviderError> {
        let mounts = tokio::task::spawn_blocking(|| {
            let disks = Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .map(|d| d.mount_point().to_string_lossy().to_string())
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(mounts)
    }

    async fn disk_usage(&self, mount: &str) -> Result<DiskUsage, ProviderError> {
        let mount = mount.to_string();
        tokio::task::spawn_blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .find(|d| d.mount_point() == Path::new(&mount))
                .map(|d| {
                    let total = d.total_space();
                    DiskUsage {
                        used_bytes: total.saturating_sub(d.available_space()),
                        total_bytes: total,
                    }
                })
                .ok_or(ProviderError::MountNotFound(mount))
        })
        .await?
    }

    async fn disk_io_counters(&self) -> Result<Vec<DiskIoCounters>, ProviderError> {
        let counters = tokio::task::spawn_blocking(|| {
            let disks = Disks::new_with_refreshed_list();
            // 同一设备可能挂载在多个位置，按设备名去重
            let mut seen = HashSet::new();
            disks
                .list()
                .iter()
                .filter(|d| seen.insert(d.name().to_os_string()))
                .map(|d| {
                    let usage = d.usage();
                    DiskIoCounters {
                        device: d.name().to_string_lossy().to_string(),
                        read_bytes: usage.total_read_bytes,
                        write_bytes: usage.total_written_bytes,
                    }
                })
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(counters)
    }

    async fn net_io_counters(&self) -> Result<NetIoCounters, ProviderError> {
        let counters = tokio::task::spawn_blocking(|| {
            let networks = Networks::new_with_refreshed_list();
            networks
                .list()
                .values()
                .fold(NetIoCounters::default(), |acc, data| NetIoCounters {
                    rx_bytes: acc.rx_bytes.saturating_add(data.total_received()),
                    tx_bytes: acc.tx_bytes.saturating_add(data.total_transmitted()),
                })
        })
        .await?;
        Ok(counters)
    }
}
