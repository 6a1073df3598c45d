//! 运行时状态模块
//!
//! 管理应用状态、时间序列存储和审计日志

pub mod app_state;
pub mod audit_log;
pub mod series_store;

pub use app_state::{get_shutdown_token, trigger_shutdown, AppState};
pub use audit_log::AuditLog;
pub use series_store::{SeriesPoint, TimeSeriesStore};
