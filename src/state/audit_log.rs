//! 审计日志
//!
//! 记录任务创建、执行、删除等事件，容量有限，超出后淘汰最旧条目

use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::config::env::constants::{DEFAULT_AUDIT_LOG_CAP, MAX_LOG_QUERY_LIMIT};
use crate::domain::task::{AuditLogEntry, LogLevel};

/// 审计日志
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    /// 最大条目数
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_LOG_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// 追加一条日志，同时输出到 tracing
    pub async fn record(&self, level: LogLevel, message: impl Into<String>) {
        let entry = AuditLogEntry::new(level, message);
        match level {
            LogLevel::Info => tracing::info!(audit = true, "{}", entry.message),
            LogLevel::Error => tracing::error!(audit = true, "{}", entry.message),
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message).await;
    }

    /// 查询日志，最新的在前
    ///
    /// `limit` 为 0 或超过上限时按上限处理；`filter` 对消息做大小写不敏感的子串匹配
    pub async fn list(&self, limit: usize, filter: Option<&str>) -> Vec<AuditLogEntry> {
        let limit = if limit == 0 || limit > MAX_LOG_QUERY_LIMIT {
            MAX_LOG_QUERY_LIMIT
        } else {
            limit
        };
        let filter = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| {
                filter
                    .as_deref()
                    .map_or(true, |f| e.message.to_lowercase().contains(f))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_newest_first() {
        let log = AuditLog::new();
        log.info("task created: a").await;
        log.error("task failed: a (boom)").await;
        log.info("task deleted: a").await;

        let entries = log.list(10, None).await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "task deleted: a");
        assert_eq!(entries[1].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_filter_and_limit() {
        let log = AuditLog::new();
        for i in 0..5 {
            log.info(format!("task ran: DNS-{}", i)).await;
            log.info(format!("task ran: temp-{}", i)).await;
        }

        let dns = log.list(0, Some("dns")).await;
        assert_eq!(dns.len(), 5);
        assert_eq!(dns[0].message, "task ran: DNS-4");

        let limited = log.list(2, Some("  ")).await;
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity() {
        let log = AuditLog::with_capacity(3);
        for i in 0..5 {
            log.info(format!("entry {}", i)).await;
        }

        assert_eq!(log.len().await, 3);
        let entries = log.list(10, None).await;
        assert_eq!(entries.last().unwrap().message, "entry 2");
    }
}
