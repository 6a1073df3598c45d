//! 命令执行器
//!
//! 维护动作需要调用系统命令（ipconfig、resolvectl 等），统一提供：
//! - 超时控制（超时后子进程随 future 一起被杀掉）
//! - 退出码检查

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
    /// 命令以非零状态退出
    NonZeroExit { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout(after) => write!(f, "Command timed out after {:?}", after),
            CommandError::NonZeroExit { code, stderr } => match code {
                Some(code) => write!(f, "Command exited with code {}: {}", code, stderr.trim()),
                None => write!(f, "Command terminated by signal: {}", stderr.trim()),
            },
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl CommandRunner {
    /// 执行简单命令（无流式输出）
    pub async fn run_simple(
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        debug!(program, ?args, "Running command");

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => {
                result.map_err(CommandError::SpawnFailed)
            }
            _ = tokio::time::sleep(timeout) => {
                Err(CommandError::Timeout(timeout))
            }
        }
    }

    /// 执行命令并要求退出码为 0
    pub async fn run_checked(
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output, CommandError> {
        let output = Self::run_simple(program, args, timeout).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(CommandError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    /// 执行 shell 命令
    ///
    /// 使用 sh -c 执行命令字符串
    pub async fn run_shell(command: &str, timeout: Duration) -> Result<Output, CommandError> {
        Self::run_checked("sh", &["-c", command], timeout).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_simple_success() {
        let result = CommandRunner::run_simple("echo", &["hello"], Duration::from_secs(5)).await;

        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_simple_not_found() {
        let result =
            CommandRunner::run_simple("nonexistent_command_12345", &[], Duration::from_secs(5))
                .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_shell_non_zero() {
        let result = CommandRunner::run_shell("echo oops >&2; exit 3", Duration::from_secs(5)).await;

        match result {
            Err(CommandError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.status)),
        }
    }

    #[tokio::test]
    async fn test_run_simple_timeout() {
        let result =
            CommandRunner::run_simple("sleep", &["5"], Duration::from_millis(100)).await;

        assert!(matches!(result, Err(CommandError::Timeout(_))));
    }
}
