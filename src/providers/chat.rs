//! 聊天能力：OpenAI 兼容与 Gemini 原生两个 wire 家族
//!
//! 差异点：
//! - 端点：`/v1/chat/completions` vs `/v1beta/models/{model}:generateContent`
//! - 系统提示：OpenAI 兼容在消息头部插入 `{role:"system"}`；Gemini 用独立的
//!   `systemInstruction` 字段，且 contents 列表没有 system 角色，system
//!   消息折叠为 user
//! - 结果位置：`choices[0].message.content` vs `candidates[0].content.parts[0].text`

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::providers::{gemini_generate_path, provider_error_message, CHAT_COMPLETIONS_PATH};
use crate::request::{ChatRequest, Role};

/// 采样参数默认值（请求未覆盖时生效）
#[derive(Debug, Clone, Copy)]
pub struct SamplingDefaults {
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// OpenAI 兼容聊天请求体
#[derive(Debug, Serialize)]
struct OpenAiChatPayload {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

/// 构建 OpenAI 兼容聊天请求，返回 (端点路径, 请求体)
pub fn build_openai_chat(req: &ChatRequest, defaults: SamplingDefaults) -> (String, Value) {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(ref system) = req.system_prompt {
        messages.push(OpenAiMessage {
            role: Role::System.as_str(),
            content: system.clone(),
        });
    }
    for msg in &req.messages {
        messages.push(OpenAiMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        });
    }

    let payload = OpenAiChatPayload {
        model: req.model.clone(),
        messages,
        temperature: req.temperature.unwrap_or(defaults.temperature),
        top_p: req.top_p.unwrap_or(defaults.top_p),
        stream: false,
    };

    (
        CHAT_COMPLETIONS_PATH.to_string(),
        serde_json::to_value(payload).unwrap_or(Value::Null),
    )
}

/// 构建 Gemini 原生聊天请求，返回 (端点路径, 请求体)
///
/// contents 没有 system 角色：system 消息折叠为 user；系统提示走
/// systemInstruction 字段。
pub fn build_gemini_chat(req: &ChatRequest, defaults: SamplingDefaults) -> (String, Value) {
    let contents: Vec<Value> = req
        .messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User | Role::System => "user",
                Role::Assistant => Role::Assistant.as_str(),
            };
            json!({
                "role": role,
                "parts": [{"text": msg.content}]
            })
        })
        .collect();

    let mut payload = json!({ "contents": contents });

    if req.temperature.is_some() || req.top_p.is_some() {
        payload["generationConfig"] = json!({
            "temperature": req.temperature.unwrap_or(defaults.temperature),
            "topP": req.top_p.unwrap_or(defaults.top_p),
        });
    }

    if let Some(ref system) = req.system_prompt {
        payload["systemInstruction"] = json!({
            "parts": [{"text": system}]
        });
    }

    (gemini_generate_path(&req.model), payload)
}

/// 解析 OpenAI 兼容聊天响应，取 choices[0].message.content
pub fn parse_openai_chat(raw_body: &str) -> Result<String, ApiError> {
    let body: Value = serde_json::from_str(raw_body)
        .map_err(|e| ApiError::parse(format!("invalid json: {}", e), raw_body))?;

    if let Some(msg) = provider_error_message(&body) {
        return Err(ApiError::Fatal(format!("API error: {}", msg)));
    }

    body.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ApiError::parse("choices[0].message.content missing", raw_body))
}

/// 解析 Gemini 原生聊天响应，取 candidates[0].content.parts[0].text
pub fn parse_gemini_chat(raw_body: &str) -> Result<String, ApiError> {
    let body: Value = serde_json::from_str(raw_body)
        .map_err(|e| ApiError::parse(format!("invalid json: {}", e), raw_body))?;

    if let Some(msg) = provider_error_message(&body) {
        return Err(ApiError::Fatal(format!("API error: {}", msg)));
    }

    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ApiError::parse("candidates[0].content.parts[0].text missing", raw_body))
}
