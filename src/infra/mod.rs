//! 基础设施模块
//!
//! 封装外部依赖（主机指标读取、系统命令执行等）

pub mod actions;
pub mod command;
pub mod provider;

pub use actions::{ActionError, ActionExecutor, SystemActionExecutor};
pub use command::CommandRunner;
pub use provider::{
    DiskIoCounters, DiskUsage, MetricsProvider, NetIoCounters, ProviderError, SysinfoProvider,
};
