//! 服务层模块
//!
//! 后台循环：指标采集、维护任务调度、过期数据清理

pub mod collector;
pub mod rate;
pub mod retention;
pub mod scheduler;

pub use collector::{CollectionReport, Collector};
pub use rate::RateSampler;
pub use retention::run_retention_loop;
pub use scheduler::{RunOutcome, SchedulerError, TaskScheduler};
