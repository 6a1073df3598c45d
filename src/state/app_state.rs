//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 全局 shutdown token，用于优雅关闭所有后台任务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::env::EnvConfig;
use crate::infra::actions::{ActionExecutor, SystemActionExecutor};
use crate::services::scheduler::TaskScheduler;

use super::audit_log::AuditLog;
use super::series_store::TimeSeriesStore;

/// 应用状态
///
/// HTTP handlers 和后台循环共享同一份存储，各组件内部自行加锁
pub struct AppState {
    /// API 密钥，None 表示不做认证
    pub api_key: Option<String>,
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 时间序列存储
    pub store: Arc<TimeSeriesStore>,
    /// 审计日志
    pub audit: Arc<AuditLog>,
    /// 维护任务调度器
    pub scheduler: Arc<TaskScheduler>,
}

impl AppState {
    /// 从环境变量创建，使用本机动作执行器
    pub fn new() -> Self {
        Self::with_config(EnvConfig::from_env(), Arc::new(SystemActionExecutor::new()))
    }

    /// 使用指定配置和动作执行器创建
    pub fn with_config(config: EnvConfig, executor: Arc<dyn ActionExecutor>) -> Self {
        tracing::info!(
            auth_enabled = config.api_key.is_some(),
            port = config.port,
            collect_interval_secs = config.collector.interval.as_secs(),
            ring_cap = config.store.ring_cap,
            retention_days = config.store.retention_days,
            "Loaded configuration"
        );

        let store = Arc::new(TimeSeriesStore::with_config(
            config.store.ring_cap,
            config.store.retention_days,
        ));
        let audit = Arc::new(AuditLog::with_capacity(config.store.audit_log_cap));
        let scheduler = Arc::new(TaskScheduler::with_config(
            audit.clone(),
            executor,
            &config.scheduler,
        ));

        Self {
            api_key: config.api_key.clone(),
            started_at: Utc::now(),
            store,
            audit,
            scheduler,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_key_copied_from_config() {
        let config = EnvConfig {
            api_key: Some("secret".to_string()),
            ..EnvConfig::default()
        };
        let state = AppState::with_config(config, Arc::new(SystemActionExecutor::new()));
        assert_eq!(state.api_key.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_components_share_audit_log() {
        let state =
            AppState::with_config(EnvConfig::default(), Arc::new(SystemActionExecutor::new()));
        state.scheduler.create_task("dns-flush", 5).await.unwrap();
        assert_eq!(state.audit.len().await, 1);
        assert_eq!(state.store.capacity(), state.config.store.ring_cap);
    }
}
