//! 任务轮询编排
//!
//! 固定间隔查询任务状态直到终态或超时。状态源是注入的 trait，轮询器
//! 不关心状态从哪个端点来；单个查询失败按失败分类处理 —— 可重试类
//! 只记日志继续下一轮（下一个 tick 就是天然重试），Fatal 直接上抛。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::task::GenerationTask;

/// 任务状态源：输入上一个快照，输出新快照
#[async_trait]
pub trait StatusSource: Sync {
    async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError>;
}

/// 轮询参数
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// 从开始轮询计起的最长等待；超过后放弃（供应商侧任务可能仍会完成）
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            cancel: None,
        }
    }
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancelled(&self) -> Result<(), ApiError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(ApiError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// 轮询单个任务直到终态
///
/// 每轮观察后调用 `on_update`（UI 进度展示用）；超时返回
/// [`ApiError::PollTimeout`]，取消返回 [`ApiError::Cancelled`]。
pub async fn poll<S, F>(
    source: &S,
    initial: GenerationTask,
    options: &PollOptions,
    mut on_update: F,
) -> Result<GenerationTask, ApiError>
where
    S: StatusSource,
    F: FnMut(&GenerationTask),
{
    let started = Instant::now();
    let mut current = initial;

    loop {
        options.check_cancelled()?;
        if current.is_terminal() {
            return Ok(current);
        }
        if started.elapsed() >= options.timeout {
            tracing::warn!(task_id = %current.task_id, waited = ?started.elapsed(), "轮询超时，放弃等待");
            return Err(ApiError::PollTimeout {
                task_id: current.task_id.clone(),
                waited: started.elapsed(),
            });
        }

        match source.fetch(&current).await {
            Ok(next) => {
                current = next;
                on_update(&current);
                tracing::debug!(
                    task_id = %current.task_id,
                    state = current.state.as_str(),
                    "轮询观察"
                );
                if current.is_terminal() {
                    return Ok(current);
                }
            }
            Err(e) if e.class().is_retryable() => {
                // 下一个 tick 就是天然重试
                tracing::warn!(task_id = %current.task_id, error = %e, "状态查询失败，下轮继续");
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(options.interval).await;
    }
}

/// 批量轮询：同一状态源下的多个任务
///
/// 每个 tick 顺序查询所有未达终态的任务；已达终态的不再查询。
/// 每次成功观察后调用 `on_update`。超时后整体返回，超时任务停留在
/// 最后一次观察到的非终态。
pub async fn poll_batch<S, F>(
    source: &S,
    initial: Vec<GenerationTask>,
    options: &PollOptions,
    mut on_update: F,
) -> Result<HashMap<String, GenerationTask>, ApiError>
where
    S: StatusSource,
    F: FnMut(&GenerationTask),
{
    let started = Instant::now();
    let mut tasks: HashMap<String, GenerationTask> = initial
        .into_iter()
        .map(|t| (t.task_id.clone(), t))
        .collect();

    loop {
        options.check_cancelled()?;

        let pending: Vec<String> = tasks
            .iter()
            .filter(|(_, t)| !t.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        if pending.is_empty() {
            return Ok(tasks);
        }
        if started.elapsed() >= options.timeout {
            tracing::warn!(
                remaining = pending.len(),
                waited = ?started.elapsed(),
                "批量轮询超时，返回当前快照"
            );
            return Ok(tasks);
        }

        for id in pending {
            options.check_cancelled()?;
            let prev = match tasks.get(&id) {
                Some(t) => t.clone(),
                None => continue,
            };
            match source.fetch(&prev).await {
                Ok(next) => {
                    on_update(&next);
                    tasks.insert(id, next);
                }
                Err(e) if e.class().is_retryable() => {
                    tracing::warn!(task_id = %id, error = %e, "状态查询失败，下轮继续");
                }
                Err(e) => return Err(e),
            }
        }

        tokio::time::sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::task::{TaskOutput, TaskState};

    use super::*;

    /// 按调用次数推进状态的脚本化状态源
    struct Scripted {
        calls: AtomicU32,
        /// 第 n 次调用（从 0 计）返回的状态
        script: Vec<TaskState>,
    }

    impl Scripted {
        fn new(script: Vec<TaskState>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let state = *self.script.get(n).unwrap_or(self.script.last().unwrap());
            Ok(match state {
                TaskState::Completed => prev.complete(TaskOutput::Text("done".to_string())),
                TaskState::Failed => prev.fail("scripted failure"),
                other => prev.observe_state(other, None),
            })
        }
    }

    fn opts(interval_ms: u64, timeout_ms: u64) -> PollOptions {
        PollOptions::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_polls_until_completed() {
        let source = Scripted::new(vec![
            TaskState::Queued,
            TaskState::Processing,
            TaskState::Completed,
        ]);
        let seen = Mutex::new(Vec::new());

        let done = poll(&source, GenerationTask::submitted("t1"), &opts(1, 5000), |t| {
            seen.lock().unwrap().push(t.state);
        })
        .await
        .unwrap();

        assert_eq!(done.state, TaskState::Completed);
        assert!(done.output.is_some());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![TaskState::Queued, TaskState::Processing, TaskState::Completed]
        );
    }

    #[tokio::test]
    async fn test_failed_task_returned_not_error() {
        let source = Scripted::new(vec![TaskState::Processing, TaskState::Failed]);
        let done = poll(&source, GenerationTask::submitted("t1"), &opts(1, 5000), |_| {})
            .await
            .unwrap();
        assert_eq!(done.state, TaskState::Failed);
        assert_eq!(done.error.as_deref(), Some("scripted failure"));
    }

    #[tokio::test]
    async fn test_timeout_gives_poll_timeout() {
        let source = Scripted::new(vec![TaskState::Processing]);
        let err = poll(&source, GenerationTask::submitted("t-slow"), &opts(5, 30), |_| {})
            .await
            .unwrap_err();
        match err {
            ApiError::PollTimeout { task_id, waited } => {
                assert_eq!(task_id, "t-slow");
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected PollTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_fetch_errors_tolerated() {
        struct Flaky {
            calls: AtomicU32,
        }

        #[async_trait]
        impl StatusSource for Flaky {
            async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::ServerError("HTTP 502".to_string()))
                } else {
                    Ok(prev.complete(TaskOutput::Text("ok".to_string())))
                }
            }
        }

        let source = Flaky {
            calls: AtomicU32::new(0),
        };
        let done = poll(&source, GenerationTask::submitted("t1"), &opts(1, 5000), |_| {})
            .await
            .unwrap();
        assert_eq!(done.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_fatal_fetch_error_aborts() {
        struct AlwaysFatal;

        #[async_trait]
        impl StatusSource for AlwaysFatal {
            async fn fetch(&self, _prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
                Err(ApiError::Fatal("HTTP 401: bad key".to_string()))
            }
        }

        let err = poll(&AlwaysFatal, GenerationTask::submitted("t1"), &opts(1, 5000), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_cancelled_mid_poll() {
        let source = Scripted::new(vec![TaskState::Processing]);
        let token = CancellationToken::new();
        let options = opts(5, 60_000).with_cancellation(token.clone());

        let handle = tokio::spawn(async move {
            poll(&source, GenerationTask::submitted("t1"), &options, |_| {}).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }

    /// 按任务 ID 区分剧本的批量状态源
    struct PerTask {
        calls: Mutex<HashMap<String, usize>>,
        scripts: HashMap<String, Vec<TaskState>>,
    }

    #[async_trait]
    impl StatusSource for PerTask {
        async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(prev.task_id.clone()).or_insert(0);
            let script = &self.scripts[&prev.task_id];
            let state = *script.get(*n).unwrap_or(script.last().unwrap());
            *n += 1;
            drop(calls);
            Ok(match state {
                TaskState::Completed => prev.complete(TaskOutput::Text("done".to_string())),
                TaskState::Failed => prev.fail("boom"),
                other => prev.observe_state(other, None),
            })
        }
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes_with_timeout() {
        // A 第一轮完成，B 第二轮失败，C 永远 Processing（超时后停在非终态）
        let mut scripts = HashMap::new();
        scripts.insert("a".to_string(), vec![TaskState::Completed]);
        scripts.insert(
            "b".to_string(),
            vec![TaskState::Processing, TaskState::Failed],
        );
        scripts.insert("c".to_string(), vec![TaskState::Processing]);
        let source = PerTask {
            calls: Mutex::new(HashMap::new()),
            scripts,
        };

        let initial = vec![
            GenerationTask::submitted("a"),
            GenerationTask::submitted("b"),
            GenerationTask::submitted("c"),
        ];
        let mut seen = Vec::new();
        let result = poll_batch(&source, initial, &opts(5, 100), |t| {
            seen.push((t.task_id.clone(), t.state));
        })
        .await
        .unwrap();

        assert_eq!(result["a"].state, TaskState::Completed);
        assert_eq!(result["b"].state, TaskState::Failed);
        assert_eq!(result["c"].state, TaskState::Processing);
        assert!(!result["c"].is_terminal());

        // 回调收到每次观察，包括终态那一帧
        assert!(seen.contains(&("a".to_string(), TaskState::Completed)));
        assert!(seen.contains(&("b".to_string(), TaskState::Failed)));
        assert!(seen.iter().any(|(id, _)| id == "c"));
    }

    #[tokio::test]
    async fn test_batch_terminal_tasks_not_refetched() {
        struct Counting {
            per_id: Mutex<HashMap<String, u32>>,
        }

        #[async_trait]
        impl StatusSource for Counting {
            async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
                *self
                    .per_id
                    .lock()
                    .unwrap()
                    .entry(prev.task_id.clone())
                    .or_insert(0) += 1;
                Ok(if prev.task_id == "fast" {
                    prev.complete(TaskOutput::Text("done".to_string()))
                } else {
                    let calls = self.per_id.lock().unwrap()[&prev.task_id];
                    if calls >= 3 {
                        prev.complete(TaskOutput::Text("done".to_string()))
                    } else {
                        prev.observe_state(TaskState::Processing, None)
                    }
                })
            }
        }

        let source = Counting {
            per_id: Mutex::new(HashMap::new()),
        };
        let initial = vec![
            GenerationTask::submitted("fast"),
            GenerationTask::submitted("slow"),
        ];
        let result = poll_batch(&source, initial, &opts(1, 5000), |_| {})
            .await
            .unwrap();

        assert_eq!(result["fast"].state, TaskState::Completed);
        assert_eq!(result["slow"].state, TaskState::Completed);
        // fast 第一轮就完成，之后不应再被查询
        assert_eq!(source.per_id.lock().unwrap()["fast"], 1);
        assert_eq!(source.per_id.lock().unwrap()["slow"], 3);
    }
}
