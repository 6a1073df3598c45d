//! 指标采集循环
//!
//! 启动后立即采集一次，之后按固定周期采集，直到收到取消信号。
//! 每个指标独立读取，单个指标失败只记录日志，不影响其他指标；
//! 每轮结束后无条件更新 `last_collector_at` 作为存活信号。

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::domain::metrics::{CpuPoint, DiskIoPoint, DiskPoint, MemPoint, NetPoint};
use crate::infra::provider::{MetricsProvider, ProviderError};
use crate::state::TimeSeriesStore;

use super::rate::{RateSampler, KIB, MIB};

/// 一轮采集的结果
#[derive(Debug, Clone)]
pub struct CollectionReport {
    /// 本轮采样时间
    pub at: DateTime<Utc>,
    /// 失败的指标及原因
    pub failures: Vec<(&'static str, String)>,
}

impl CollectionReport {
    /// 是否所有指标都采集成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 指标采集器
///
/// 持有磁盘 IO 与网络 IO 的速率基线，是这些基线唯一的写入者
pub struct Collector {
    provider: Arc<dyn MetricsProvider>,
    store: Arc<TimeSeriesStore>,
    config: CollectorConfig,
    disk_read: RateSampler,
    disk_write: RateSampler,
    net_rx: RateSampler,
    net_tx: RateSampler,
}

impl Collector {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        store: Arc<TimeSeriesStore>,
        config: CollectorConfig,
    ) -> Self {
        let period = config.interval;
        Self {
            provider,
            store,
            config,
            disk_read: RateSampler::new(period, MIB),
            disk_write: RateSampler::new(period, MIB),
            net_rx: RateSampler::new(period, KIB),
            net_tx: RateSampler::new(period, KIB),
        }
    }

    /// 运行采集循环
    ///
    /// 正在进行的一轮采集会完整执行完毕后才响应取消
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            metric_timeout_secs = self.config.metric_timeout.as_secs(),
            "Starting metrics collector"
        );

        // 首个 tick 立即触发；provider 卡顿时错过的 tick 不补发
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Metrics collector stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.collect_once().await;
                    debug!(
                        at = %report.at,
                        failed = report.failures.len(),
                        "Collection pass finished"
                    );
                }
            }
        }
    }

    /// 以当前时间采集一轮
    pub async fn collect_once(&mut self) -> CollectionReport {
        self.collect_at(Utc::now()).await
    }

    /// 以指定时间戳采集一轮
    pub async fn collect_at(&mut self, at: DateTime<Utc>) -> CollectionReport {
        let mut failures = Vec::new();

        if let Err(e) = self.collect_cpu(at).await {
            failures.push(("cpu", e));
        }
        if let Err(e) = self.collect_memory(at).await {
            failures.push(("mem", e));
        }
        if let Err(e) = self.collect_disk_usage(at).await {
            failures.push(("disk", e));
        }
        if let Err(e) = self.collect_disk_io(at).await {
            failures.push(("diskio", e));
        }
        if let Err(e) = self.collect_network(at).await {
            failures.push(("net", e));
        }

        for (metric, error) in &failures {
            warn!(metric = *metric, error = %error, "Metric collection failed");
        }

        self.store.set_last_collector_at(at).await;

        CollectionReport {
            at,
            failures: failures
                .into_iter()
                .map(|(metric, e)| (metric, e.to_string()))
                .collect(),
        }
    }

    async fn collect_cpu(&self, at: DateTime<Utc>) -> Result<(), ProviderError> {
        let value = bounded(self.config.metric_timeout, self.provider.cpu_percent()).await?;
        self.store.append(CpuPoint { at, value }).await;
        Ok(())
    }

    async fn collect_memory(&self, at: DateTime<Utc>) -> Result<(), ProviderError> {
        let value =
            bounded(self.config.metric_timeout, self.provider.memory_used_percent()).await?;
        self.store.append(MemPoint { at, value }).await;
        Ok(())
    }

    /// 逐个挂载点读取容量；容量为 0 的伪文件系统跳过，单个挂载点失败不影响其余
    async fn collect_disk_usage(&self, at: DateTime<Utc>) -> Result<(), ProviderError> {
        let limit = self.config.metric_timeout;
        let mounts = bounded(limit, self.provider.disk_partitions()).await?;

        let mut recorded = 0usize;
        for mount in mounts {
            match bounded(limit, self.provider.disk_usage(&mount)).await {
                Ok(usage) if usage.total_bytes == 0 => {
                    debug!(mount = %mount, "Skipping zero-capacity mount");
                }
                Ok(usage) => {
                    self.store
                        .append_disk(DiskPoint::new(at, mount, usage.used_bytes, usage.total_bytes))
                        .await;
                    recorded += 1;
                }
                Err(e) => {
                    debug!(mount = %mount, error = %e, "Failed to read mount usage");
                }
            }
        }

        debug!(recorded, "Disk usage collected");
        Ok(())
    }

    async fn collect_disk_io(&mut self, at: DateTime<Utc>) -> Result<(), ProviderError> {
        let counters = bounded(self.config.metric_timeout, self.provider.disk_io_counters()).await?;
        if counters.is_empty() {
            return Err(ProviderError::Unavailable("no disk devices reported".to_string()));
        }

        let (read, write) = counters.iter().fold((0u64, 0u64), |(r, w), c| {
            (r.saturating_add(c.read_bytes), w.saturating_add(c.write_bytes))
        });

        let point = DiskIoPoint {
            at,
            read_mbs: self.disk_read.sample(read, at),
            write_mbs: self.disk_write.sample(write, at),
        };
        self.store.append(point).await;
        Ok(())
    }

    async fn collect_network(&mut self, at: DateTime<Utc>) -> Result<(), ProviderError> {
        let counters = bounded(self.config.metric_timeout, self.provider.net_io_counters()).await?;

        let point = NetPoint {
            at,
            rx_kbs: self.net_rx.sample(counters.rx_bytes, at),
            tx_kbs: self.net_tx.sample(counters.tx_bytes, at),
        };
        self.store.append(point).await;
        Ok(())
    }
}

/// 为单次 provider 调用加超时，超时按该指标失败处理
async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
