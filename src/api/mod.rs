//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod health;
pub mod logs;
pub mod metrics;
pub mod tasks;

use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .merge(health::router())
        // Metrics
        .merge(metrics::router())
        // Tasks & maintenance
        .merge(tasks::router())
        // Audit log
        .merge(logs::router())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
