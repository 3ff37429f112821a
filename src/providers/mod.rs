//! 协议适配层：统一请求 ↔ 各供应商 wire 格式
//!
//! 每个子模块负责一类能力的请求构建与响应解析：
//! - **chat**: OpenAI 兼容 / Gemini 原生两个 wire 家族
//! - **image**: Gemini 内联图像与聊天式 Markdown 图像链接
//! - **video**: grok / veo / sora / 通用四种提交形状与状态解析
//! - **music**: Suno 提交（含续写 / 翻唱）与单个 / 批量状态查询
//! - **mj**: Midjourney imagine / action / blend / describe 与任务查询
//!
//! 供应商家族在入口处按前缀表解析一次（而非满代码 `starts_with` 判断），
//! 之后全部走枚举分派。

use serde_json::Value;

use crate::error::ApiError;

pub mod chat;
pub mod image;
pub mod mj;
pub mod music;
pub mod video;

// ==================== 固定端点（按能力，不按模型参数化） ====================

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const VIDEO_CREATE_PATH: &str = "/v1/video/create";
pub const VIDEO_QUERY_PATH: &str = "/v1/video/query";
pub const MUSIC_SUBMIT_PATH: &str = "/suno/submit/music";
pub const LYRICS_SUBMIT_PATH: &str = "/suno/submit/lyrics";
/// 批量查询（POST {ids:[...]}）
pub const MUSIC_FETCH_BATCH_PATH: &str = "/suno/fetch";
pub const MJ_IMAGINE_PATH: &str = "/mj/submit/imagine";
pub const MJ_ACTION_PATH: &str = "/mj/submit/action";
pub const MJ_BLEND_PATH: &str = "/mj/submit/blend";
pub const MJ_DESCRIBE_PATH: &str = "/mj/submit/describe";
pub const MJ_UPLOAD_PATH: &str = "/mj/submit/upload-discord-images";

/// Gemini 原生端点：模型名在路径中
pub fn gemini_generate_path(model: &str) -> String {
    format!("/v1beta/models/{}:generateContent", model)
}

pub fn music_fetch_path(task_id: &str) -> String {
    format!("/suno/fetch/{}", task_id)
}

pub fn mj_fetch_path(task_id: &str) -> String {
    format!("/mj/task/{}/fetch", task_id)
}

// ==================== 供应商家族（前缀表一次解析） ====================

/// 聊天 / 图像 wire 家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFamily {
    OpenAiCompatible,
    GeminiNative,
}

impl ChatFamily {
    /// 有序前缀匹配；未命中默认 OpenAI 兼容
    pub fn resolve(model: &str) -> Self {
        if model.starts_with("gemini-") {
            ChatFamily::GeminiNative
        } else {
            ChatFamily::OpenAiCompatible
        }
    }
}

/// 视频提交 wire 家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFamily {
    Grok,
    Veo,
    Sora,
    Generic,
}

/// 有序前缀表：顺序即匹配优先级
const VIDEO_FAMILY_PREFIXES: &[(&str, VideoFamily)] = &[
    ("grok", VideoFamily::Grok),
    ("veo", VideoFamily::Veo),
    ("sora", VideoFamily::Sora),
];

impl VideoFamily {
    /// 未识别前缀回落到通用形状
    pub fn resolve(model: &str) -> Self {
        for (prefix, family) in VIDEO_FAMILY_PREFIXES {
            if model.starts_with(prefix) {
                return *family;
            }
        }
        VideoFamily::Generic
    }
}

/// 异步任务类别：决定状态查询走哪个端点与解析器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Video,
    Music,
    Lyrics,
    Mj,
}

/// 供应商在 200 响应体里报的错（`{"error": {...}}` 或 `{"error": "..."}`）
///
/// 解析器先查它再报「形状未知」，让调用方拿到可行动的消息。
pub(crate) fn provider_error_message(body: &Value) -> Option<String> {
    let err = body.get("error")?;
    match err {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| err.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

// ==================== 任务 ID 信封提取 ====================

/// 从提交响应中提取任务 ID
///
/// 各端点信封不一：`{data: "<id>"}`、`{result: "<id>"}`、`{result: ["<id>", ...]}`、
/// 或裸字符串。都不匹配时报解析失败并附原始片段。
pub fn extract_task_id(body: &Value) -> Result<String, ApiError> {
    let candidate = body
        .get("data")
        .or_else(|| body.get("result"))
        .unwrap_or(body);

    let id = match candidate {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    };

    match id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ApiError::parse(
            "task id not found in submit response",
            &body.to_string(),
        )),
    }
}
