//! 错误类型与失败分类
//!
//! 与 retry 模块配合：`FailureClass` 决定是否重试以及退避倍率；
//! `Fatal` / `Parse` / `PollTimeout` / `UploadExhausted` 原样上抛，由调用方决策。

use std::time::Duration;

use thiserror::Error;

/// 编排层错误（网络、解析、轮询超时、图床上传等）
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP 429 或消息中含 "rate limit"
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP 500/502/503/504
    #[error("Server error: {0}")]
    ServerError(String),

    /// 连接或读取超时
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 不可重试的错误（凭证错误、非 429 的 4xx、请求格式错误等）
    #[error("Fatal: {0}")]
    Fatal(String),

    /// 响应形状无法识别，携带原始响应片段便于排查
    #[error("Failed to parse response ({reason}): {snippet}")]
    Parse { reason: String, snippet: String },

    /// 轮询超时：客户端放弃等待，供应商侧任务可能仍会完成
    #[error("Poll timeout after {waited:?}: task {task_id}")]
    PollTimeout { task_id: String, waited: Duration },

    /// 所有图床均上传失败，聚合每个后端的失败原因
    #[error("{0}")]
    UploadExhausted(UploadFailure),

    /// 重试次数耗尽，携带最后一次失败与尝试次数
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },

    /// 调用方停止标志触发（协作式取消，不会远程取消任务）
    #[error("Cancelled by caller")]
    Cancelled,
}

/// 失败分类：重试器据此决定是否重试与退避倍率
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    ServerError,
    Timeout,
    Fatal,
}

impl FailureClass {
    /// 退避倍率：限流退得更快（限流是供应商在卸载负载，不是故障）
    pub fn backoff_multiplier(self) -> u32 {
        match self {
            FailureClass::RateLimited => 3,
            FailureClass::ServerError | FailureClass::Timeout => 2,
            FailureClass::Fatal => 1,
        }
    }

    pub fn is_retryable(self) -> bool {
        self != FailureClass::Fatal
    }
}

impl ApiError {
    /// 失败分类。消息中含 "rate limit" 的 Fatal 也归为限流（部分网关用 4xx 文本报限流）
    pub fn class(&self) -> FailureClass {
        match self {
            ApiError::RateLimited(_) => FailureClass::RateLimited,
            ApiError::ServerError(_) => FailureClass::ServerError,
            ApiError::Timeout(_) => FailureClass::Timeout,
            ApiError::Fatal(msg) if msg.to_lowercase().contains("rate limit") => {
                FailureClass::RateLimited
            }
            _ => FailureClass::Fatal,
        }
    }

    /// 从 HTTP 状态码分类（响应体片段作为消息）
    pub fn from_status(status: u16, body: &str) -> Self {
        let msg = format!("HTTP {}: {}", status, truncate_snippet(body));
        match status {
            429 => ApiError::RateLimited(msg),
            500 | 502 | 503 | 504 => ApiError::ServerError(msg),
            _ => ApiError::Fatal(msg),
        }
    }

    /// 解析失败：携带截断的原始响应，绝不静默返回空结果
    pub fn parse(reason: impl Into<String>, raw_body: &str) -> Self {
        ApiError::Parse {
            reason: reason.into(),
            snippet: truncate_snippet(raw_body),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return ApiError::Timeout(e.to_string());
        }
        if let Some(status) = e.status() {
            return ApiError::from_status(status.as_u16(), &e.to_string());
        }
        ApiError::Fatal(e.to_string())
    }
}

/// 图床上传聚合失败：按尝试顺序记录每个后端的名称与原因
#[derive(Debug, Clone)]
pub struct UploadFailure {
    /// (后端名, 失败原因)，保持尝试顺序
    pub attempts: Vec<(String, String)>,
}

impl std::fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "所有图床均上传失败，请检查网络连接或手动输入图片 URL")?;
        writeln!(f, "尝试的服务:")?;
        for (name, reason) in &self.attempts {
            writeln!(f, "  - {}: {}", name, reason)?;
        }
        write!(
            f,
            "建议：\n  1. 检查网络连接\n  2. 使用 VPN 或代理\n  3. 改用手动输入图片 URL"
        )
    }
}

/// 截断响应片段（排查解析失败时避免日志爆炸）
pub(crate) fn truncate_snippet(body: &str) -> String {
    const MAX: usize = 500;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}
