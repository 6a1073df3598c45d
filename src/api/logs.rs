//! 审计日志 API

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::task::AuditLogEntry;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 日志查询参数
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// 大小写不敏感的子串过滤
    pub q: Option<String>,
    /// 最大条数，缺省、不为正或超过上限时取上限
    pub limit: Option<i64>,
}

/// 创建日志路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/logs", get(list_logs))
}

/// 查询审计日志，最新的在前
///
/// GET /api/logs?q=dns&limit=100
/// 需要 API Key（如已配置）
async fn list_logs(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<AuditLogEntry>> {
    let entries = state
        .audit
        .list(
            query
                .limit
                .and_then(|l| usize::try_from(l).ok())
                .unwrap_or(0),
            query.q.as_deref(),
        )
        .await;
    Json(entries)
}
