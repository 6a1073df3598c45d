//! 健康检查 API
//!
//! 包含 /api/health 端点

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    now: DateTime<Utc>,
    /// 最近一轮采集的时间，采集器尚未运行时为 null
    last_collector_at: Option<DateTime<Utc>>,
    version: &'static str,
    uptime_secs: i64,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/health", get(health_check))
}

/// 健康检查 - 返回当前时间和采集器最近一次运行时间
///
/// GET /api/health
/// 需要 API Key（如已配置）
async fn health_check(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let now = Utc::now();

    Json(HealthResponse {
        status: "ok",
        now,
        last_collector_at: state.store.last_collector_at().await,
        version: VERSION,
        uptime_secs: (now - state.started_at).num_seconds(),
    })
}
