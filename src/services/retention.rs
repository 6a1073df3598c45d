//! 过期数据清理
//!
//! 按固定周期（默认每天）删除超过保留期的采样点

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::state::TimeSeriesStore;

/// 运行清理循环
///
/// 首次等待一个周期后再清理，刚启动时存储中不会有过期数据
pub async fn run_retention_loop(
    store: Arc<TimeSeriesStore>,
    period: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        period_secs = period.as_secs(),
        retention_days = store.retention().num_days(),
        "Starting retention pruner"
    );

    let mut interval = tokio::time::interval(period);

    // 跳过立即触发的首个 tick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention pruner stopped");
                break;
            }
            _ = interval.tick() => {
                let removed = store.prune_for_retention().await;
                tracing::info!(removed, "Pruned expired samples");
            }
        }
    }
}
