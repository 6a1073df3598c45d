//! 维护任务调度器
//!
//! 每个任务有独立的执行间隔。调度循环按固定周期检查到期任务，
//! 每个到期任务在独立的 tokio 任务中执行，调度本身不等待动作完成。
//!
//! 同一任务同一时刻最多只有一次执行：派发前在写锁内检查并设置 `running`，
//! 正在执行的任务既不会被下一次 tick 再次派发，手动执行也会返回 `AlreadyRunning`。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::domain::task::{Task, TaskAction, TaskStatus};
use crate::infra::actions::{ActionError, ActionExecutor};
use crate::state::AuditLog;

/// 调度器错误
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("task is already running: {0}")]
    AlreadyRunning(String),
    #[error("task execution aborted: {0}")]
    Aborted(String),
}

/// 单次执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: TaskStatus,
    /// 失败时的错误详情
    pub error: Option<String>,
}

/// 维护任务调度器
pub struct TaskScheduler {
    tasks: RwLock<HashMap<String, Task>>,
    audit: Arc<AuditLog>,
    executor: Arc<dyn ActionExecutor>,
    action_timeout: Duration,
}

impl TaskScheduler {
    pub fn new(audit: Arc<AuditLog>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self::with_config(audit, executor, &SchedulerConfig::default())
    }

    pub fn with_config(
        audit: Arc<AuditLog>,
        executor: Arc<dyn ActionExecutor>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            audit,
            executor,
            action_timeout: config.action_timeout,
        }
    }

    /// 创建任务
    ///
    /// 新任务默认启用，从未执行，因此下一次 tick 即到期
    pub async fn create_task(
        &self,
        name: &str,
        interval_minutes: i64,
    ) -> Result<Task, SchedulerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulerError::InvalidArgument("name is required".to_string()));
        }
        let interval = u32::try_from(interval_minutes)
            .ok()
            .filter(|m| *m > 0)
            .ok_or_else(|| {
                SchedulerError::InvalidArgument(format!(
                    "interval must be a positive number of minutes, got {}",
                    interval_minutes
                ))
            })?;

        let task = Task::new(Uuid::new_v4().to_string(), name.to_string(), interval);
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());

        info!(task_id = %task.id, name = %task.name, interval_minutes = interval, "Task created");
        self.audit.info(format!("task created: {}", task.name)).await;
        Ok(task)
    }

    /// 所有任务，按名称排序
    pub async fn list_tasks(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<Task> = tasks.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// 启用或停用任务，停用的任务不会被 tick 派发，但仍可手动执行
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Task, SchedulerError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        task.enabled = enabled;
        info!(task_id = %id, enabled, "Task toggled");
        Ok(task.clone())
    }

    /// 删除任务
    ///
    /// 正在执行的动作不会被中断，其结果在完成时被丢弃
    pub async fn delete_task(&self, id: &str) -> Result<(), SchedulerError> {
        let removed = self
            .tasks
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        info!(task_id = %id, name = %removed.name, "Task deleted");
        self.audit.info(format!("task deleted: {}", removed.name)).await;
        Ok(())
    }

    /// 立即执行任务并等待结果
    ///
    /// 动作在独立的 tokio 任务中执行；调用方的 future 被丢弃（如 HTTP 客户端断开）时，
    /// 执行仍会完成并清除 `running` 标记
    pub async fn run_now(self: &Arc<Self>, id: &str) -> Result<RunOutcome, SchedulerError> {
        let task = self.begin_run(id).await?;
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.execute(task, Utc::now()).await })
            .await
            .map_err(|e| SchedulerError::Aborted(e.to_string()))
    }

    /// 以当前时间检查一次
    pub async fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.tick_at(Utc::now()).await
    }

    /// 以指定时间检查到期任务并派发
    ///
    /// `now` 同时作为本次执行的 `last_run_at`，到期判断与时间戳使用同一时钟。
    /// 返回派发出的执行句柄，调用方可以不等待
    pub async fn tick_at(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let due: Vec<Task> = {
            let mut tasks = self.tasks.write().await;
            tasks
                .values_mut()
                .filter(|t| t.enabled && !t.running && t.is_due(now))
                .map(|t| {
                    t.running = true;
                    t.clone()
                })
                .collect()
        };

        if !due.is_empty() {
            debug!(count = due.len(), "Dispatching due tasks");
        }

        due.into_iter()
            .map(|task| {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    scheduler.execute(task, now).await;
                })
            })
            .collect()
    }

    /// 运行调度循环，首次检查在一个周期之后
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        info!(period_secs = period.as_secs(), "Starting task scheduler");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Task scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// 检查任务存在且空闲，并标记为执行中
    async fn begin_run(&self, id: &str) -> Result<Task, SchedulerError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        if task.running {
            return Err(SchedulerError::AlreadyRunning(id.to_string()));
        }
        task.running = true;
        Ok(task.clone())
    }

    /// 执行动作并回写结果，调用前任务必须已被标记为执行中
    ///
    /// 结果在完成时写回，`last_run_at` 记为派发时刻 `started_at`
    async fn execute(&self, task: Task, started_at: DateTime<Utc>) -> RunOutcome {
        let action = TaskAction::from_task_name(&task.name);
        debug!(task_id = %task.id, action = action.as_str(), "Running task");

        let result = match tokio::time::timeout(self.action_timeout, self.perform(action)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.action_timeout)),
        };

        let outcome = match &result {
            Ok(()) => RunOutcome {
                status: TaskStatus::Ok,
                error: None,
            },
            Err(e) => RunOutcome {
                status: TaskStatus::Err,
                error: Some(e.to_string()),
            },
        };

        let name = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&task.id) {
                Some(current) => {
                    current.running = false;
                    current.record_run(outcome.status, started_at);
                    Some(current.name.clone())
                }
                None => None,
            }
        };

        match (name, &outcome.error) {
            (None, _) => {
                debug!(task_id = %task.id, "Task deleted while running, result discarded");
            }
            (Some(name), Some(error)) => {
                warn!(task_id = %task.id, name = %name, error = %error, "Task failed");
                self.audit
                    .error(format!("task failed: {} ({})", name, error))
                    .await;
            }
            (Some(name), None) => {
                self.audit.info(format!("task ran: {}", name)).await;
            }
        }

        outcome
    }

    async fn perform(&self, action: TaskAction) -> Result<(), ActionError> {
        match action {
            TaskAction::FlushDns => self.executor.flush_dns_cache().await,
            TaskAction::ClearTemp => self.executor.clear_temp_files().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct FakeExecutor {
        dns_calls: AtomicUsize,
        temp_calls: AtomicUsize,
        fail_with: Option<&'static str>,
        /// 设置后每次执行需要先拿到一个许可
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeExecutor {
        async fn finish(&self) -> Result<(), ActionError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            match self.fail_with {
                Some(msg) => Err(ActionError::Unsupported(msg.to_string())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for FakeExecutor {
        async fn flush_dns_cache(&self) -> Result<(), ActionError> {
            self.dns_calls.fetch_add(1, Ordering::SeqCst);
            self.finish().await
        }

        async fn clear_temp_files(&self) -> Result<(), ActionError> {
            self.temp_calls.fetch_add(1, Ordering::SeqCst);
            self.finish().await
        }
    }

    fn scheduler(executor: Arc<FakeExecutor>) -> (Arc<TaskScheduler>, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::new());
        let scheduler = Arc::new(TaskScheduler::new(audit.clone(), executor));
        (scheduler, audit)
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let (scheduler, audit) = scheduler(Arc::new(FakeExecutor::default()));

        assert!(matches!(
            scheduler.create_task("dns-flush", 0).await,
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            scheduler.create_task("dns-flush", -5).await,
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            scheduler.create_task("   ", 5).await,
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(audit.is_empty().await);

        let task = scheduler.create_task("dns-flush", 5).await.unwrap();
        assert!(task.enabled);
        assert!(task.last_run_at.is_none());
        assert_eq!(task.status, TaskStatus::Unset);

        let logs = audit.list(10, None).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "task created: dns-flush");
    }

    #[tokio::test]
    async fn test_tick_respects_interval() {
        let executor = Arc::new(FakeExecutor::default());
        let (scheduler, audit) = scheduler(executor.clone());
        let task = scheduler.create_task("dns-flush", 5).await.unwrap();

        let t0 = Utc::now();
        join_all(scheduler.tick_at(t0).await).await;
        assert_eq!(executor.dns_calls.load(Ordering::SeqCst), 1);

        let ran = scheduler.get_task(&task.id).await.unwrap();
        assert_eq!(ran.status, TaskStatus::Ok);
        assert!(!ran.running);
        assert_eq!(ran.last_run_at, Some(t0));

        let handles = scheduler.tick_at(t0 + ChronoDuration::minutes(1)).await;
        assert!(handles.is_empty());
        assert_eq!(executor.dns_calls.load(Ordering::SeqCst), 1);

        join_all(scheduler.tick_at(t0 + ChronoDuration::minutes(5)).await).await;
        assert_eq!(executor.dns_calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.temp_calls.load(Ordering::SeqCst), 0);

        let messages: Vec<String> = audit
            .list(10, Some("ran"))
            .await
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["task ran: dns-flush", "task ran: dns-flush"]);
        assert_eq!(
            scheduler.get_task(&task.id).await.unwrap().last_run_at,
            Some(t0 + ChronoDuration::minutes(5))
        );
    }

    #[tokio::test]
    async fn test_disabled_task_not_dispatched() {
        let executor = Arc::new(FakeExecutor::default());
        let (scheduler, _) = scheduler(executor.clone());
        let task = scheduler.create_task("clear-cache", 1).await.unwrap();

        scheduler.set_enabled(&task.id, false).await.unwrap();
        assert!(scheduler.tick_at(Utc::now()).await.is_empty());

        // 停用不影响手动执行
        let outcome = scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Ok);
        assert_eq!(executor.temp_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_now_unknown_id() {
        let (scheduler, audit) = scheduler(Arc::new(FakeExecutor::default()));
        scheduler.create_task("temp-clean", 10).await.unwrap();
        let before = scheduler.list_tasks().await;

        let result = scheduler.run_now("missing").await;
        assert!(matches!(result, Err(SchedulerError::NotFound(_))));

        assert_eq!(audit.len().await, 1);
        let after = scheduler.list_tasks().await;
        assert_eq!(after.len(), before.len());
        assert_eq!(after[0].status, TaskStatus::Unset);
    }

    #[tokio::test]
    async fn test_failure_sets_err_and_stamps_last_run() {
        let executor = Arc::new(FakeExecutor {
            fail_with: Some("permission denied"),
            ..Default::default()
        });
        let (scheduler, audit) = scheduler(executor.clone());
        let task = scheduler.create_task("dns-flush", 5).await.unwrap();

        let outcome = scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Err);

        let failed = scheduler.get_task(&task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Err);
        let last = failed.last_run_at.unwrap();

        // 失败的任务在同一间隔内不会重试
        assert!(scheduler.tick_at(last + ChronoDuration::minutes(1)).await.is_empty());

        let errors = audit.list(10, Some("failed")).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "task failed: dns-flush (permission denied)");
    }

    #[tokio::test]
    async fn test_running_task_is_not_redispatched() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (scheduler, _) = scheduler(executor.clone());
        let task = scheduler.create_task("dns-flush", 1).await.unwrap();

        let now = Utc::now();
        let first = scheduler.tick_at(now).await;
        assert_eq!(first.len(), 1);
        assert!(scheduler.get_task(&task.id).await.unwrap().running);

        // 执行时间超过间隔，下一次 tick 仍然不会重复派发
        assert!(scheduler
            .tick_at(now + ChronoDuration::minutes(2))
            .await
            .is_empty());
        assert!(matches!(
            scheduler.run_now(&task.id).await,
            Err(SchedulerError::AlreadyRunning(_))
        ));

        gate.add_permits(1);
        join_all(first).await;

        let done = scheduler.get_task(&task.id).await.unwrap();
        assert!(!done.running);
        assert_eq!(done.status, TaskStatus::Ok);
        assert_eq!(executor.dns_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_run_now_still_clears_running() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (scheduler, audit) = scheduler(executor.clone());
        let task = scheduler.create_task("dns-flush", 5).await.unwrap();

        // 调用方在动作完成前放弃等待
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), scheduler.run_now(&task.id)).await;
        assert!(abandoned.is_err());
        assert!(scheduler.get_task(&task.id).await.unwrap().running);

        gate.add_permits(1);
        let mut waited = 0;
        while scheduler.get_task(&task.id).await.unwrap().running && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        let done = scheduler.get_task(&task.id).await.unwrap();
        assert!(!done.running);
        assert_eq!(done.status, TaskStatus::Ok);
        assert_eq!(audit.list(10, Some("ran")).await.len(), 1);

        let last = done.last_run_at.unwrap();
        let handles = scheduler.tick_at(last + ChronoDuration::hours(1)).await;
        assert_eq!(handles.len(), 1);
        gate.add_permits(1);
        join_all(handles).await;

        gate.add_permits(1);
        let outcome = scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Ok);
        assert_eq!(executor.dns_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delete_during_run_discards_result() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (scheduler, audit) = scheduler(executor);
        let task = scheduler.create_task("temp-clean", 5).await.unwrap();

        let handles = scheduler.tick_at(Utc::now()).await;
        scheduler.delete_task(&task.id).await.unwrap();
        gate.add_permits(1);
        join_all(handles).await;

        assert!(scheduler.list_tasks().await.is_empty());
        let messages: Vec<String> = audit
            .list(10, None)
            .await
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(
            messages,
            vec!["task deleted: temp-clean", "task created: temp-clean"]
        );
    }
}
