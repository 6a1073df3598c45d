//! 指标时间序列领域模型

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 序列种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Cpu,
    Memory,
    Disk,
    DiskIo,
    Network,
}

impl SeriesKind {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Cpu => "cpu",
            SeriesKind::Memory => "mem",
            SeriesKind::Disk => "disk",
            SeriesKind::DiskIo => "diskio",
            SeriesKind::Network => "net",
        }
    }
}

/// 带时间戳的数据点
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// CPU 使用率采样点（百分比）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CpuPoint {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    #[serde(rename = "v")]
    pub value: f64,
}

/// 内存使用率采样点（百分比）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemPoint {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    #[serde(rename = "v")]
    pub value: f64,
}

/// 单个挂载点的磁盘容量采样点
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskPoint {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    pub mount: String,
    pub used_pct: f64,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl DiskPoint {
    /// 由已用/总字节数构建，自动计算百分比
    pub fn new(at: DateTime<Utc>, mount: impl Into<String>, used_bytes: u64, total_bytes: u64) -> Self {
        let used_pct = if total_bytes > 0 {
            used_bytes as f64 / total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            at,
            mount: mount.into(),
            used_pct,
            used_bytes,
            total_bytes,
        }
    }
}

/// 磁盘读写速率采样点 (MB/s)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiskIoPoint {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    #[serde(rename = "readMBs")]
    pub read_mbs: f64,
    #[serde(rename = "writeMBs")]
    pub write_mbs: f64,
}

/// 网络收发速率采样点 (KB/s)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetPoint {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    #[serde(rename = "rxKBs")]
    pub rx_kbs: f64,
    #[serde(rename = "txKBs")]
    pub tx_kbs: f64,
}

impl Timestamped for CpuPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Timestamped for MemPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Timestamped for DiskPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Timestamped for DiskIoPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Timestamped for NetPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

/// 单个挂载点的查询结果
#[derive(Clone, Debug, Serialize)]
pub struct DiskSeries {
    pub mount: String,
    pub points: Vec<DiskPoint>,
}

/// 规范化挂载点路径，保证同一卷始终落在同一序列
///
/// Windows 下盘符大小写不敏感且 `/` 与 `\` 混用；Unix 下只去掉多余的结尾分隔符。
pub fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim();
    if cfg!(windows) {
        let mut s = trimmed.replace('/', "\\").to_uppercase();
        while s.len() > 3 && s.ends_with('\\') {
            s.pop();
        }
        if s.len() == 2 && s.ends_with(':') {
            s.push('\\');
        }
        s
    } else {
        let mut s = trimmed.to_string();
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_point_percent() {
        let p = DiskPoint::new(Utc::now(), "/", 25, 100);
        assert_eq!(p.used_pct, 25.0);

        let empty = DiskPoint::new(Utc::now(), "/", 0, 0);
        assert_eq!(empty.used_pct, 0.0);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_normalize_mount_unix() {
        assert_eq!(normalize_mount("/"), "/");
        assert_eq!(normalize_mount("/data/"), "/data");
        assert_eq!(normalize_mount("/data//"), "/data");
        assert_eq!(normalize_mount(" /home "), "/home");
    }

    #[cfg(windows)]
    #[test]
    fn test_normalize_mount_windows() {
        assert_eq!(normalize_mount("c:/"), "C:\\");
        assert_eq!(normalize_mount("C:"), "C:\\");
        assert_eq!(normalize_mount("d:\\Data\\"), "D:\\DATA");
    }

    #[test]
    fn test_point_serialization_keys() {
        let at = Utc::now();
        let json = serde_json::to_value(NetPoint { at, rx_kbs: 1.5, tx_kbs: 2.0 }).unwrap();
        assert_eq!(json["rxKBs"], 1.5);
        assert_eq!(json["txKBs"], 2.0);
        assert!(json.get("t").is_some());

        let json = serde_json::to_value(DiskPoint::new(at, "/", 1, 2)).unwrap();
        assert_eq!(json["usedBytes"], 1);
        assert_eq!(json["totalBytes"], 2);
        assert_eq!(json["usedPct"], 50.0);
    }
}
