//! 维护任务与审计日志领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务最近一次执行状态
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    /// 从未执行
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

impl TaskStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Unset => "",
            TaskStatus::Ok => "OK",
            TaskStatus::Err => "ERR",
        }
    }
}

/// 任务对应的系统动作
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskAction {
    FlushDns,
    ClearTemp,
}

impl TaskAction {
    /// 根据任务名称选择动作
    ///
    /// 名称包含 "dns" 刷新 DNS 缓存；其余（含 "temp"/"cache"）一律清理临时文件
    pub fn from_task_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if name.contains("dns") {
            TaskAction::FlushDns
        } else {
            TaskAction::ClearTemp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::FlushDns => "flush_dns",
            TaskAction::ClearTemp => "clear_temp",
        }
    }
}

/// 定时维护任务
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    /// 执行间隔（分钟）
    #[serde(rename = "everyMinutes")]
    pub interval_minutes: u32,
    #[serde(rename = "lastRun")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub enabled: bool,
    /// 是否有一次执行正在进行
    pub running: bool,
}

impl Task {
    /// 创建新任务
    pub fn new(id: String, name: String, interval_minutes: u32) -> Self {
        Self {
            id,
            name,
            interval_minutes,
            last_run_at: None,
            status: TaskStatus::Unset,
            enabled: true,
            running: false,
        }
    }

    /// 在 `now` 时刻是否到期
    ///
    /// 从未执行过的任务总是到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => now - last >= chrono::Duration::minutes(i64::from(self.interval_minutes)),
        }
    }

    /// 记录一次执行结果，`last_run_at` 只前进不后退
    pub fn record_run(&mut self, status: TaskStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_run_at = Some(match self.last_run_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }
}

/// 审计日志级别
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

/// 审计日志条目
#[derive(Clone, Debug, Serialize)]
pub struct AuditLogEntry {
    #[serde(rename = "t")]
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(rename = "msg")]
    pub message: String,
}

impl AuditLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }
}
