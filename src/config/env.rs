//! 环境变量配置加载

use std::env;
use std::time::Duration;
use tracing::warn;

use self::constants::*;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API 密钥，为空时不做认证
    pub api_key: Option<String>,
    /// 服务监听端口
    pub port: u16,
    /// 采集配置
    pub collector: CollectorConfig,
    /// 存储配置
    pub store: StoreConfig,
    /// 任务调度配置
    pub scheduler: SchedulerConfig,
}

/// 采集配置
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// 采集周期
    pub interval: Duration,
    /// 单个指标读取超时
    pub metric_timeout: Duration,
}

/// 存储配置
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// 每个序列最大点数
    pub ring_cap: usize,
    /// 数据保留天数
    pub retention_days: i64,
    /// 定期清理间隔
    pub prune_interval: Duration,
    /// 审计日志最大条目数
    pub audit_log_cap: usize,
}

/// 任务调度配置
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// 调度检查周期
    pub tick_interval: Duration,
    /// 单次动作执行超时
    pub action_timeout: Duration,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        // API Key - 支持旧名称兼容
        let api_key = load_with_fallback("DAEMON_API_KEY", "API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if env::var("API_KEY").is_ok() && env::var("DAEMON_API_KEY").is_err() {
            warn!("Deprecated environment variable API_KEY detected. Please use DAEMON_API_KEY");
        }

        // Port
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            api_key,
            port,
            collector: CollectorConfig::from_env(),
            store: StoreConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
        }
    }
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        let interval_secs = env::var("COLLECT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_COLLECT_INTERVAL_SECS);

        let metric_timeout_secs = env::var("METRIC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_METRIC_TIMEOUT_SECS);

        Self {
            interval: Duration::from_secs(interval_secs),
            metric_timeout: Duration::from_secs(metric_timeout_secs),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_COLLECT_INTERVAL_SECS),
            metric_timeout: Duration::from_secs(DEFAULT_METRIC_TIMEOUT_SECS),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let ring_cap = env::var("RING_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_RING_CAP)
            .max(1);

        let retention_days = parse_retention_days(env::var("RETENTION_DAYS").ok());
        let prune_interval = parse_prune_interval(env::var("PRUNE_INTERVAL_HOURS").ok());

        let audit_log_cap = env::var("AUDIT_LOG_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_AUDIT_LOG_CAP)
            .max(1);

        Self {
            ring_cap,
            retention_days,
            prune_interval,
            audit_log_cap,
        }
    }
}

/// 保留天数：必须为正且能换算为时长，否则使用默认值
fn parse_retention_days(raw: Option<String>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0 && chrono::Duration::try_days(*v).is_some())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

/// 清理间隔（小时）：非正或换算溢出时使用默认值
fn parse_prune_interval(raw: Option<String>) -> Duration {
    let secs = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .and_then(|hours| hours.checked_mul(SECS_PER_HOUR))
        .unwrap_or(DEFAULT_PRUNE_INTERVAL_HOURS * SECS_PER_HOUR);
    Duration::from_secs(secs)
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let tick_secs = env::var("SCHEDULER_TICK_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SCHEDULER_TICK_SECS);

        let action_timeout_secs = env::var("ACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT_SECS);

        Self {
            tick_interval: Duration::from_secs(tick_secs),
            action_timeout: Duration::from_secs(action_timeout_secs),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ring_cap: DEFAULT_RING_CAP,
            retention_days: DEFAULT_RETENTION_DAYS,
            prune_interval: Duration::from_secs(DEFAULT_PRUNE_INTERVAL_HOURS * SECS_PER_HOUR),
            audit_log_cap: DEFAULT_AUDIT_LOG_CAP,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            port: DEFAULT_PORT,
            collector: CollectorConfig::default(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_SCHEDULER_TICK_SECS),
            action_timeout: Duration::from_secs(DEFAULT_ACTION_TIMEOUT_SECS),
        }
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 8080;

    /// 默认采集周期（秒）
    pub const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 30;

    /// 单个指标读取超时（秒）
    pub const DEFAULT_METRIC_TIMEOUT_SECS: u64 = 10;

    /// 每个序列最大点数
    pub const DEFAULT_RING_CAP: usize = 50_000;

    /// 数据保留天数
    pub const DEFAULT_RETENTION_DAYS: i64 = 30;

    /// 保留清理间隔（小时）
    pub const DEFAULT_PRUNE_INTERVAL_HOURS: u64 = 24;

    pub const SECS_PER_HOUR: u64 = 3600;

    /// 调度检查周期（秒）
    pub const DEFAULT_SCHEDULER_TICK_SECS: u64 = 60;

    /// 维护动作超时（秒）
    pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 60;

    /// 审计日志最大条目数
    pub const DEFAULT_AUDIT_LOG_CAP: usize = 50_000;

    /// 单次日志查询最大返回条数
    pub const MAX_LOG_QUERY_LIMIT: usize = 1000;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        // 设置测试环境变量
        env::set_var("SYSDASH_TEST_PRIMARY", "primary_value");
        env::set_var("SYSDASH_TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("SYSDASH_TEST_PRIMARY", "SYSDASH_TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("SYSDASH_TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("SYSDASH_TEST_PRIMARY", "SYSDASH_TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::remove_var("SYSDASH_TEST_FALLBACK");
        assert_eq!(
            load_with_fallback("SYSDASH_TEST_PRIMARY", "SYSDASH_TEST_FALLBACK"),
            None
        );
    }

    #[test]
    fn test_defaults() {
        let collector = CollectorConfig::default();
        assert_eq!(collector.interval, Duration::from_secs(30));

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.tick_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_store_values_fall_back_on_overflow() {
        assert_eq!(
            parse_prune_interval(Some("6".to_string())),
            Duration::from_secs(6 * 3600)
        );
        assert_eq!(
            parse_prune_interval(Some(u64::MAX.to_string())),
            Duration::from_secs(DEFAULT_PRUNE_INTERVAL_HOURS * 3600)
        );
        assert_eq!(
            parse_prune_interval(Some("0".to_string())),
            Duration::from_secs(DEFAULT_PRUNE_INTERVAL_HOURS * 3600)
        );

        assert_eq!(parse_retention_days(Some("7".to_string())), 7);
        assert_eq!(
            parse_retention_days(Some(i64::MAX.to_string())),
            DEFAULT_RETENTION_DAYS
        );
        assert_eq!(parse_retention_days(Some("-3".to_string())), DEFAULT_RETENTION_DAYS);
        assert_eq!(parse_retention_days(None), DEFAULT_RETENTION_DAYS);
    }
}
