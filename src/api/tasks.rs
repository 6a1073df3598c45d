//! 维护任务 API
//!
//! 包含 /api/tasks 相关端点以及手动触发过期数据清理

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::task::{Task, TaskStatus};
use crate::error::ApiResult;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 创建任务请求
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(rename = "everyMinutes")]
    pub interval_minutes: i64,
}

/// 更新任务请求
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub enabled: bool,
}

/// 手动执行响应
#[derive(Debug, Serialize)]
struct RunResponse {
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// 清理响应
#[derive(Debug, Serialize)]
struct PruneResponse {
    status: &'static str,
    removed: usize,
}

/// 创建任务路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/prune", post(prune_retention))
        .route("/api/tasks/:id", patch(update_task).delete(delete_task))
        .route("/api/tasks/:id/run", post(run_task))
}

/// 列出所有任务
///
/// GET /api/tasks
/// 需要 API Key（如已配置）
async fn list_tasks(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<Task>> {
    Json(state.scheduler.list_tasks().await)
}

/// 创建任务
///
/// POST /api/tasks
/// 需要 API Key（如已配置）
async fn create_task(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .scheduler
        .create_task(&req.name, req.interval_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// 启用或停用任务
///
/// PATCH /api/tasks/:id
/// 需要 API Key（如已配置）
async fn update_task(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let task = state.scheduler.set_enabled(&id, req.enabled).await?;
    Ok(Json(task))
}

/// 删除任务
///
/// DELETE /api/tasks/:id
/// 需要 API Key（如已配置）
async fn delete_task(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.scheduler.delete_task(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 立即执行任务并返回结果
///
/// POST /api/tasks/:id/run
/// 需要 API Key（如已配置）。动作失败时仍返回 200，`status` 为 ERR
async fn run_task(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.scheduler.run_now(&id).await?;
    Ok(Json(RunResponse {
        status: outcome.status,
        error: outcome.error,
    }))
}

/// 按保留期清理过期数据
///
/// POST /api/tasks/prune
/// 需要 API Key（如已配置）
async fn prune_retention(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let removed = state.store.prune_for_retention().await;
    tracing::info!(removed, "Manual retention prune");

    Json(PruneResponse {
        status: "pruned",
        removed,
    })
}
