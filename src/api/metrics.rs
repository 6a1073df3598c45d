//! 指标查询 API
//!
//! 包含 /api/metrics/{cpu,mem,disk,diskio,net} 端点。
//! `range` 参数支持 Go 风格时长（`90s`、`1h30m`、`1.5h`）以及天数后缀（`7d`），
//! 缺省、无法解析或不为正时使用默认窗口。

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::metrics::{CpuPoint, DiskIoPoint, DiskSeries, MemPoint, NetPoint};
use crate::middleware::RequireApiKey;
use crate::state::{AppState, SeriesPoint};

/// CPU、内存、IO 的默认窗口
const DEFAULT_RANGE_HOURS: i64 = 1;

/// 磁盘容量的默认窗口
const DEFAULT_DISK_RANGE_HOURS: i64 = 24;

/// 创建指标查询路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/metrics/cpu", get(cpu_metrics))
        .route("/api/metrics/mem", get(mem_metrics))
        .route("/api/metrics/disk", get(disk_metrics))
        .route("/api/metrics/diskio", get(disk_io_metrics))
        .route("/api/metrics/net", get(net_metrics))
}

/// 查询参数
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

impl RangeQuery {
    fn window(&self, default: Duration) -> Duration {
        self.range
            .as_deref()
            .and_then(parse_range)
            .unwrap_or(default)
    }

    /// 解析窗口并计算起点；起点超出可表示时间范围时回落到默认窗口
    fn resolve(&self, default: Duration, now: DateTime<Utc>) -> (Duration, DateTime<Utc>) {
        let window = self.window(default);
        match now.checked_sub_signed(window) {
            Some(cutoff) => (window, cutoff),
            None => (default, now - default),
        }
    }
}

/// 通用序列响应
#[derive(Debug, Serialize)]
struct SeriesResponse<P> {
    range: String,
    points: Vec<P>,
}

/// CPU 响应，附带平均值和 p95
#[derive(Debug, Serialize)]
struct CpuResponse {
    range: String,
    points: Vec<CpuPoint>,
    avg: f64,
    p95: f64,
}

/// 内存响应，附带最新值
#[derive(Debug, Serialize)]
struct MemResponse {
    range: String,
    points: Vec<MemPoint>,
    latest: f64,
}

/// 磁盘容量响应，按挂载点分组
#[derive(Debug, Serialize)]
struct DiskResponse {
    range: String,
    mounts: Vec<DiskSeries>,
}

/// CPU 使用率
///
/// GET /api/metrics/cpu?range=1h
/// 需要 API Key（如已配置）
async fn cpu_metrics(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let (window, cutoff) = query.resolve(Duration::hours(DEFAULT_RANGE_HOURS), Utc::now());
    let points = state.store.since::<CpuPoint>(cutoff).await;

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let (avg, p95) = summarize(&values);

    Json(CpuResponse {
        range: format_range(window),
        points,
        avg,
        p95,
    })
}

/// 内存使用率
///
/// GET /api/metrics/mem?range=1h
/// 需要 API Key（如已配置）
async fn mem_metrics(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let (window, cutoff) = query.resolve(Duration::hours(DEFAULT_RANGE_HOURS), Utc::now());
    let points = state.store.since::<MemPoint>(cutoff).await;
    let latest = points.last().map_or(0.0, |p| p.value);

    Json(MemResponse {
        range: format_range(window),
        points,
        latest,
    })
}

/// 各挂载点磁盘使用率
///
/// GET /api/metrics/disk?range=24h
/// 需要 API Key（如已配置）
async fn disk_metrics(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let (window, cutoff) = query.resolve(Duration::hours(DEFAULT_DISK_RANGE_HOURS), Utc::now());
    let mounts = state.store.disk_since(cutoff).await;

    Json(DiskResponse {
        range: format_range(window),
        mounts,
    })
}

/// 磁盘读写速率（MiB/s）
///
/// GET /api/metrics/diskio?range=1h
/// 需要 API Key（如已配置）
async fn disk_io_metrics(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    Json(series_response::<DiskIoPoint>(&state, &query).await)
}

/// 网络收发速率（KiB/s）
///
/// GET /api/metrics/net?range=1h
/// 需要 API Key（如已配置）
async fn net_metrics(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    Json(series_response::<NetPoint>(&state, &query).await)
}

async fn series_response<P: SeriesPoint>(state: &AppState, query: &RangeQuery) -> SeriesResponse<P> {
    let (window, cutoff) = query.resolve(Duration::hours(DEFAULT_RANGE_HOURS), Utc::now());
    SeriesResponse {
        range: format_range(window),
        points: state.store.since::<P>(cutoff).await,
    }
}

/// 计算平均值和 p95
///
/// p95 取升序排列后下标 `floor((n - 1) * 0.95)` 的值；空输入返回 (0, 0)
pub fn summarize(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let avg = values.iter().sum::<f64>() / values.len() as f64;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((sorted.len() - 1) as f64 * 0.95) as usize;

    (avg, sorted[index])
}

/// 解析查询窗口
///
/// `Nd` 表示 N 天，其余按 Go 时长语法解析；结果不为正时返回 None
pub fn parse_range(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let window = match raw.strip_suffix('d') {
        Some(days) if !days.is_empty() && days.bytes().all(|b| b.is_ascii_digit()) => {
            Duration::try_days(days.parse().ok()?)?
        }
        _ => parse_go_duration(raw)?,
    };

    (window > Duration::zero()).then_some(window)
}

/// 解析 Go 风格时长，例如 `300ms`、`1.5h`、`2h45m`
fn parse_go_duration(raw: &str) -> Option<Duration> {
    let (negative, mut rest) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    if rest == "0" {
        return Some(Duration::zero());
    }
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > i64::MAX as f64 {
        return None;
    }
    let nanos = total_nanos as i64;
    Some(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

/// 按 Go 时长格式输出窗口，例如 `1h0m0s`、`168h0m0s`、`1m30s`、`500ms`
pub fn format_range(window: Duration) -> String {
    let Some(nanos) = window.num_nanoseconds() else {
        return format!("{}h0m0s", window.num_hours());
    };
    if nanos == 0 {
        return "0s".to_string();
    }
    let sign = if nanos < 0 { "-" } else { "" };
    let nanos = nanos.unsigned_abs();

    if nanos < 1_000_000_000 {
        let (value, unit) = if nanos < 1_000 {
            (nanos as f64, "ns")
        } else if nanos < 1_000_000 {
            (nanos as f64 / 1e3, "µs")
        } else {
            (nanos as f64 / 1e6, "ms")
        };
        return format!("{}{}{}", sign, trim_float(value), unit);
    }

    let whole_secs = nanos / 1_000_000_000;
    let frac = nanos % 1_000_000_000;
    let hours = whole_secs / 3600;
    let minutes = (whole_secs % 3600) / 60;
    let secs = (whole_secs % 60) as f64 + frac as f64 / 1e9;

    let mut out = String::from(sign);
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", trim_float(secs)));
    out
}

fn trim_float(value: f64) -> String {
    let s = format!("{:.9}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
