//! 系统维护动作
//!
//! `ActionExecutor` 执行 DNS 缓存刷新和临时文件清理，调度器只关心成功与否

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::command::{CommandError, CommandRunner};

/// 单个系统命令超时
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// 临时目录下会被整体删除的子目录名
const DISPOSABLE_DIRS: [&str; 3] = ["temp", "cache", "tmp"];

/// 维护动作错误
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unsupported(String),
    #[error("action timed out after {0:?}")]
    Timeout(Duration),
}

/// 维护动作执行器
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 刷新系统 DNS 缓存
    async fn flush_dns_cache(&self) -> Result<(), ActionError>;

    /// 清理系统临时目录
    async fn clear_temp_files(&self) -> Result<(), ActionError>;
}

/// 调用本机命令和文件系统的执行器
pub struct SystemActionExecutor {
    temp_dir: PathBuf,
}

impl SystemActionExecutor {
    pub fn new() -> Self {
        Self::with_temp_dir(std::env::temp_dir())
    }

    /// 指定要清理的临时目录
    pub fn with_temp_dir(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }
}

impl Default for SystemActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for SystemActionExecutor {
    async fn flush_dns_cache(&self) -> Result<(), ActionError> {
        flush_dns().await
    }

    async fn clear_temp_files(&self) -> Result<(), ActionError> {
        clear_temp_dir(&self.temp_dir).await
    }
}

#[cfg(windows)]
async fn flush_dns() -> Result<(), ActionError> {
    CommandRunner::run_checked("ipconfig", &["/flushdns"], COMMAND_TIMEOUT).await?;
    Ok(())
}

#[cfg(target_os = "macos")]
async fn flush_dns() -> Result<(), ActionError> {
    CommandRunner::run_shell(
        "dscacheutil -flushcache; killall -HUP mDNSResponder",
        COMMAND_TIMEOUT,
    )
    .await?;
    Ok(())
}

#[cfg(all(not(windows), not(target_os = "macos")))]
async fn flush_dns() -> Result<(), ActionError> {
    // systemd-resolved 优先，其次 nscd
    if let Err(e) =
        CommandRunner::run_shell("resolvectl flush-caches || resolvectl reload", COMMAND_TIMEOUT)
            .await
    {
        tracing::debug!(error = %e, "resolvectl flush failed, trying nscd");
    } else {
        return Ok(());
    }

    if let Err(e) = CommandRunner::run_shell("nscd -i hosts", COMMAND_TIMEOUT).await {
        tracing::debug!(error = %e, "nscd flush failed");
        return Err(ActionError::Unsupported(
            "dns flush not supported without elevated permissions".to_string(),
        ));
    }
    Ok(())
}

/// 清理临时目录
///
/// 删除顶层文件以及名为 temp/cache/tmp 的子目录；单个条目删除失败会被忽略，
/// 只有目录本身无法打开时才返回错误。遍历中途读取失败时保留已完成的清理并停止
async fn clear_temp_dir(base: &std::path::Path) -> Result<(), ActionError> {
    let mut entries = tokio::fs::read_dir(base).await?;
    let mut removed = 0usize;
    let mut skipped = 0usize;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %base.display(), error = %e, "Failed to read temp entry");
                break;
            }
        };

        let path = entry.path();
        let is_dir = match entry.file_type().await {
            Ok(ft) => ft.is_dir(),
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let result = if is_dir {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !DISPOSABLE_DIRS.contains(&name.as_str()) {
                continue;
            }
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to remove temp entry");
                skipped += 1;
            }
        }
    }

    tracing::info!(dir = %base.display(), removed, skipped, "Temp directory cleared");
    Ok(())
}
