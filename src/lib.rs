//! Sysdash Agent - 主机指标采集与维护任务代理
//!
//! 周期采集 CPU、内存、磁盘、磁盘 IO 和网络 IO，保存为有容量上限的时间序列，
//! 同时按各自间隔执行维护任务（刷新 DNS 缓存、清理临时文件），并通过 HTTP 提供查询。

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::infra::provider::SysinfoProvider;
use crate::services::{run_retention_loop, Collector};
use crate::state::{get_shutdown_token, trigger_shutdown, AppState};

/// 命令行覆盖的运行时配置
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖 PORT 环境变量
    pub port_override: Option<u16>,
}

/// 初始化日志
///
/// 默认级别可通过 RUST_LOG 覆盖
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sysdash_agent=info,tower_http=info"));

    // 重复初始化（例如测试中）直接忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// 启动代理：后台循环 + HTTP 服务，收到 Ctrl+C 后优雅退出
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> anyhow::Result<()> {
    init_tracing();

    let mut state = AppState::new();
    if let Some(port) = runtime.port_override {
        state.config.port = port;
    }
    let state = Arc::new(state);
    let shutdown = get_shutdown_token();

    // 指标采集
    let collector = Collector::new(
        Arc::new(SysinfoProvider::new()),
        state.store.clone(),
        state.config.collector.clone(),
    );
    let collector_handle = tokio::spawn(collector.run(shutdown.clone()));

    // 过期数据清理
    let retention_handle = tokio::spawn(run_retention_loop(
        state.store.clone(),
        state.config.store.prune_interval,
        shutdown.clone(),
    ));

    // 维护任务调度
    let scheduler_handle = tokio::spawn(
        state
            .scheduler
            .clone()
            .run(state.config.scheduler.tick_interval, shutdown.clone()),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        version = config::env::constants::VERSION,
        "Sysdash agent listening"
    );

    let app = api::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    // HTTP 服务退出后确保后台循环也停止
    trigger_shutdown();
    for (name, handle) in [
        ("collector", collector_handle),
        ("retention", retention_handle),
        ("scheduler", scheduler_handle),
    ] {
        if let Err(e) = handle.await {
            tracing::warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Sysdash agent stopped");
    Ok(())
}

/// 等待 Ctrl+C 或全局 shutdown
async fn shutdown_signal() {
    let shutdown = get_shutdown_token();

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                trigger_shutdown();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                shutdown.cancelled().await;
            }
        },
        _ = shutdown.cancelled() => {}
    }
}
