//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod metrics;
pub mod task;

// Re-exports for convenience
pub use metrics::{
    normalize_mount, CpuPoint, DiskIoPoint, DiskPoint, DiskSeries, MemPoint, NetPoint, SeriesKind,
    Timestamped,
};
pub use task::{AuditLogEntry, LogLevel, Task, TaskAction, TaskStatus};
