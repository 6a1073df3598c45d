//! 时间序列存储
//!
//! 五类指标序列的有界缓冲区，支持按时间范围查询和按截止时间清理

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::env::constants::{DEFAULT_RETENTION_DAYS, DEFAULT_RING_CAP};
use crate::domain::metrics::{
    normalize_mount, CpuPoint, DiskIoPoint, DiskPoint, DiskSeries, MemPoint, NetPoint, SeriesKind,
    Timestamped,
};

/// 有界 FIFO 序列
///
/// 追加到尾部，超出容量时从头部淘汰最旧的点
#[derive(Debug)]
pub struct Series<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T: Timestamped + Clone> Series<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// 追加数据点，必要时淘汰头部
    pub fn push(&mut self, point: T) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// 复制出 `timestamp >= cutoff` 的所有点，保持原有顺序
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<T> {
        self.points
            .iter()
            .filter(|p| p.timestamp() >= cutoff)
            .cloned()
            .collect()
    }

    /// 原地移除早于 `cutoff` 的点，返回移除数量
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.points.len();
        self.points.retain(|p| p.timestamp() >= cutoff);
        before - self.points.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 受锁保护的全部序列
#[derive(Debug)]
pub struct SeriesSet {
    cpu: Series<CpuPoint>,
    memory: Series<MemPoint>,
    disk_io: Series<DiskIoPoint>,
    network: Series<NetPoint>,
    /// 挂载点 -> 磁盘容量序列，按挂载点名称有序
    disks: BTreeMap<String, Series<DiskPoint>>,
    /// 最近一次采集完成时间
    last_collector_at: Option<DateTime<Utc>>,
}

impl SeriesSet {
    fn new(capacity: usize) -> Self {
        Self {
            cpu: Series::with_capacity(capacity),
            memory: Series::with_capacity(capacity),
            disk_io: Series::with_capacity(capacity),
            network: Series::with_capacity(capacity),
            disks: BTreeMap::new(),
            last_collector_at: None,
        }
    }
}

/// 可存入单一（非分区）序列的数据点
pub trait SeriesPoint: Timestamped + Clone + Send + Sync + 'static {
    const KIND: SeriesKind;

    fn series(set: &SeriesSet) -> &Series<Self>;
    fn series_mut(set: &mut SeriesSet) -> &mut Series<Self>;
}

impl SeriesPoint for CpuPoint {
    const KIND: SeriesKind = SeriesKind::Cpu;

    fn series(set: &SeriesSet) -> &Series<Self> {
        &set.cpu
    }
    fn series_mut(set: &mut SeriesSet) -> &mut Series<Self> {
        &mut set.cpu
    }
}

impl SeriesPoint for MemPoint {
    const KIND: SeriesKind = SeriesKind::Memory;

    fn series(set: &SeriesSet) -> &Series<Self> {
        &set.memory
    }
    fn series_mut(set: &mut SeriesSet) -> &mut Series<Self> {
        &mut set.memory
    }
}

impl SeriesPoint for DiskIoPoint {
    const KIND: SeriesKind = SeriesKind::DiskIo;

    fn series(set: &SeriesSet) -> &Series<Self> {
        &set.disk_io
    }
    fn series_mut(set: &mut SeriesSet) -> &mut Series<Self> {
        &mut set.disk_io
    }
}

impl SeriesPoint for NetPoint {
    const KIND: SeriesKind = SeriesKind::Network;

    fn series(set: &SeriesSet) -> &Series<Self> {
        &set.network
    }
    fn series_mut(set: &mut SeriesSet) -> &mut Series<Self> {
        &mut set.network
    }
}

/// 时间序列存储
///
/// 单个读写锁保护所有序列；写操作独占，读操作共享并复制结果
pub struct TimeSeriesStore {
    inner: RwLock<SeriesSet>,
    /// 每个序列的最大点数
    capacity: usize,
    /// 保留时长
    retention: Duration,
}

impl TimeSeriesStore {
    /// 使用默认容量和保留时长创建
    pub fn new() -> Self {
        Self::with_config(DEFAULT_RING_CAP, DEFAULT_RETENTION_DAYS)
    }

    /// 使用自定义配置创建
    ///
    /// 保留天数超出可表示范围时使用默认值
    pub fn with_config(capacity: usize, retention_days: i64) -> Self {
        let capacity = capacity.max(1);
        let retention = Duration::try_days(retention_days)
            .unwrap_or_else(|| Duration::days(DEFAULT_RETENTION_DAYS));
        Self {
            inner: RwLock::new(SeriesSet::new(capacity)),
            capacity,
            retention,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// 追加数据点到对应序列
    pub async fn append<P: SeriesPoint>(&self, point: P) {
        let mut set = self.inner.write().await;
        P::series_mut(&mut set).push(point);
    }

    /// 追加磁盘容量点，按规范化后的挂载点分序列
    pub async fn append_disk(&self, mut point: DiskPoint) {
        let key = normalize_mount(&point.mount);
        point.mount = key.clone();

        let capacity = self.capacity;
        let mut set = self.inner.write().await;
        set.disks
            .entry(key)
            .or_insert_with(|| Series::with_capacity(capacity))
            .push(point);
    }

    /// 查询 `cutoff` 之后（含）的数据点
    pub async fn since<P: SeriesPoint>(&self, cutoff: DateTime<Utc>) -> Vec<P> {
        let set = self.inner.read().await;
        P::series(&set).since(cutoff)
    }

    /// 按挂载点查询磁盘容量序列
    ///
    /// 没有命中点的挂载点不出现在结果中；结果按挂载点名称排序
    pub async fn disk_since(&self, cutoff: DateTime<Utc>) -> Vec<DiskSeries> {
        let set = self.inner.read().await;
        set.disks
            .iter()
            .filter_map(|(mount, series)| {
                let points = series.since(cutoff);
                if points.is_empty() {
                    None
                } else {
                    Some(DiskSeries {
                        mount: mount.clone(),
                        points,
                    })
                }
            })
            .collect()
    }

    /// 移除所有序列中早于 `cutoff` 的点，返回移除总数
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut set = self.inner.write().await;
        let mut removed = set.cpu.prune_older_than(cutoff)
            + set.memory.prune_older_than(cutoff)
            + set.disk_io.prune_older_than(cutoff)
            + set.network.prune_older_than(cutoff);
        for series in set.disks.values_mut() {
            removed += series.prune_older_than(cutoff);
        }
        removed
    }

    /// 按保留时长清理
    ///
    /// 截止时间早于可表示范围时不会有数据过期
    pub async fn prune_for_retention(&self) -> usize {
        match Utc::now().checked_sub_signed(self.retention) {
            Some(cutoff) => self.prune_older_than(cutoff).await,
            None => 0,
        }
    }

    /// 最近一次采集完成时间
    pub async fn last_collector_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_collector_at
    }

    /// 更新最近一次采集完成时间
    pub async fn set_last_collector_at(&self, at: DateTime<Utc>) {
        self.inner.write().await.last_collector_at = Some(at);
    }

    /// 获取某类序列当前点数（磁盘为所有挂载点之和）
    pub async fn len(&self, kind: SeriesKind) -> usize {
        let set = self.inner.read().await;
        match kind {
            SeriesKind::Cpu => set.cpu.len(),
            SeriesKind::Memory => set.memory.len(),
            SeriesKind::DiskIo => set.disk_io.len(),
            SeriesKind::Network => set.network.len(),
            SeriesKind::Disk => set.disks.values().map(Series::len).sum(),
        }
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(at: DateTime<Utc>, value: f64) -> CpuPoint {
        CpuPoint { at, value }
    }

    #[tokio::test]
    async fn test_append_respects_capacity() {
        let store = TimeSeriesStore::with_config(3, 30);
        let t0 = Utc::now();

        for i in 0..6 {
            store.append(cpu(t0 + Duration::seconds(i), i as f64)).await;
            let expected = std::cmp::min(i as usize + 1, 3);
            assert_eq!(store.len(SeriesKind::Cpu).await, expected);
        }

        // 只保留最近 3 个，顺序不变
        let values: Vec<f64> = store
            .since::<CpuPoint>(t0 - Duration::hours(1))
            .await
            .iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_since_filters_inclusive() {
        let store = TimeSeriesStore::new();
        let t0 = Utc::now() - Duration::minutes(10);

        for i in 0..5 {
            store
                .append(MemPoint {
                    at: t0 + Duration::minutes(i),
                    value: i as f64,
                })
                .await;
        }

        let points = store.since::<MemPoint>(t0 + Duration::minutes(2)).await;
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);

        let future = store.since::<MemPoint>(Utc::now() + Duration::hours(1)).await;
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn test_series_are_independent() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();

        store.append(cpu(now, 10.0)).await;
        store
            .append(NetPoint {
                at: now,
                rx_kbs: 1.0,
                tx_kbs: 2.0,
            })
            .await;

        assert_eq!(store.len(SeriesKind::Cpu).await, 1);
        assert_eq!(store.len(SeriesKind::Network).await, 1);
        assert_eq!(store.len(SeriesKind::Memory).await, 0);
        assert_eq!(store.len(SeriesKind::DiskIo).await, 0);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let store = TimeSeriesStore::new();
        let t0 = Utc::now() - Duration::hours(3);

        for i in 0..3 {
            let at = t0 + Duration::hours(i);
            store.append(cpu(at, i as f64)).await;
            store
                .append(DiskIoPoint {
                    at,
                    read_mbs: 0.0,
                    write_mbs: 0.0,
                })
                .await;
            store.append_disk(DiskPoint::new(at, "/", 1, 2)).await;
        }

        let cutoff = t0 + Duration::hours(1);
        let removed = store.prune_older_than(cutoff).await;
        assert_eq!(removed, 3);

        let after_first = store.since::<CpuPoint>(t0).await;
        assert_eq!(store.prune_older_than(cutoff).await, 0);
        let after_second = store.since::<CpuPoint>(t0).await;

        assert_eq!(after_first, after_second);
        assert_eq!(after_first.len(), 2);
        assert_eq!(store.len(SeriesKind::Disk).await, 2);
    }

    #[tokio::test]
    async fn test_prune_for_retention() {
        let store = TimeSeriesStore::with_config(100, 30);
        let now = Utc::now();

        store.append(cpu(now - Duration::days(31), 1.0)).await;
        store.append(cpu(now - Duration::days(1), 2.0)).await;

        assert_eq!(store.prune_for_retention().await, 1);
        let remaining = store.since::<CpuPoint>(now - Duration::days(365)).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_oversized_retention() {
        let store = TimeSeriesStore::with_config(10, i64::MAX);
        assert_eq!(store.retention(), Duration::days(DEFAULT_RETENTION_DAYS));

        // 可换算但起点早于最小时间
        let store = TimeSeriesStore::with_config(10, 100_000_000);
        store.append(cpu(Utc::now() - Duration::days(3650), 1.0)).await;
        assert_eq!(store.prune_for_retention().await, 0);
        assert_eq!(store.len(SeriesKind::Cpu).await, 1);
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_disk_since_groups_and_orders_mounts() {
        let store = TimeSeriesStore::new();
        let old = Utc::now() - Duration::days(2);
        let now = Utc::now();

        store.append_disk(DiskPoint::new(now, "/var", 1, 10)).await;
        store.append_disk(DiskPoint::new(now, "/data/", 2, 10)).await;
        store.append_disk(DiskPoint::new(now, "/data", 3, 10)).await;
        store.append_disk(DiskPoint::new(old, "/boot", 1, 10)).await;

        let result = store.disk_since(now - Duration::hours(24)).await;
        let mounts: Vec<&str> = result.iter().map(|s| s.mount.as_str()).collect();

        // /boot 没有命中点被省略；/data 与 /data/ 合并为一个序列
        assert_eq!(mounts, vec!["/data", "/var"]);
        assert_eq!(result[0].points.len(), 2);
        assert!(result[0].points.iter().all(|p| p.mount == "/data"));
    }

    #[tokio::test]
    async fn test_last_collector_at() {
        let store = TimeSeriesStore::new();
        assert!(store.last_collector_at().await.is_none());

        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(30);
        store.set_last_collector_at(t2).await;
        store.set_last_collector_at(t1).await;

        // last-write-wins
        assert_eq!(store.last_collector_at().await, Some(t1));
    }
}
