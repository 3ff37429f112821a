//! 重试执行器：失败分类 + 指数退避
//!
//! 包裹一次供应商 HTTP 调用。限流 / 5xx / 超时按
//! `delay = base * multiplier^attempt + jitter` 退避后重试（限流倍率 3，
//! 其余 2），Fatal 立即上抛不重试。退避只挂起当前任务，不阻塞其他工作。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, FailureClass};

/// 重试策略：次数上限、退避基数、抖动上限
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    /// 每次退避附加 [0, jitter) 的随机抖动，避免重试风暴对齐
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(3),
            jitter: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts,
            base,
            jitter,
        }
    }

    /// 测试 / 快速路径用：无抖动
    pub fn no_jitter(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            jitter: Duration::ZERO,
        }
    }

    /// 第 attempt 次失败后的确定性退避（不含抖动），attempt 从 0 计
    pub fn backoff(&self, class: FailureClass, attempt: u32) -> Duration {
        let factor = class.backoff_multiplier().saturating_pow(attempt);
        self.base.saturating_mul(factor)
    }

    /// 含抖动的实际退避时长
    pub fn delay_for(&self, class: FailureClass, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.backoff(class, attempt) + jitter
    }
}

/// 以重试策略执行一个工作单元（一次供应商调用）
///
/// - 可重试类失败：退避后重试，最多 `max_attempts` 次；
///   次数耗尽返回 [`ApiError::RetriesExhausted`]，内含最后一次失败
/// - Fatal：立即上抛
/// - 取消标志在每次尝试之间检查（协作式，不抢占在途请求）
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut work: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last: Option<ApiError> = None;

    for attempt in 0..policy.max_attempts {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
        }

        match work().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let class = e.class();
                if !class.is_retryable() {
                    return Err(e);
                }

                let delay = policy.delay_for(class, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "请求失败，退避后重试"
                );
                last = Some(e);

                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ApiError::RetriesExhausted {
        attempts: policy.max_attempts,
        last: Box::new(
            last.unwrap_or_else(|| ApiError::Fatal("retry executor ran zero attempts".to_string())),
        ),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_exhausts_attempts_on_server_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::no_jitter(3, Duration::from_millis(10));

        let calls2 = calls.clone();
        let started = Instant::now();
        let result: Result<(), _> = execute(&policy, None, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::ServerError("HTTP 503".to_string()))
            }
        })
        .await;
        let elapsed = started.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ApiError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ApiError::ServerError(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other.err()),
        }
        // multiplier=2: 退避 10ms + 20ms（最后一次失败后不再等待）
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::no_jitter(5, Duration::from_millis(1));

        let calls2 = calls.clone();
        let result: Result<(), _> = execute(&policy, None, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Fatal("HTTP 401: bad key".to_string()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ApiError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::no_jitter(5, Duration::from_millis(1));

        let calls2 = calls.clone();
        let result = execute(&policy, None, move || {
            let calls = calls2.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::Timeout("read timeout".to_string()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rate_limit_backs_off_at_least_as_fast_as_server_error() {
        let policy = RetryPolicy::no_jitter(5, Duration::from_secs(3));
        for attempt in 0..5 {
            let rate = policy.backoff(FailureClass::RateLimited, attempt);
            let server = policy.backoff(FailureClass::ServerError, attempt);
            assert!(rate >= server, "attempt {}: {:?} < {:?}", attempt, rate, server);
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let calls2 = calls.clone();
        let result: Result<(), _> = execute(&policy, Some(&token), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
