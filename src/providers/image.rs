//! 图像生成能力
//!
//! 两条路径：
//! - Gemini 原生：响应在 candidates[i].content.parts[j].inlineData.data 里带
//!   base64 图像，位置不保证在首个槽位，解析按「提取策略」顺序推进，最后一步
//!   区分「供应商报错」与「形状未知」
//! - 其他模型：聊天式响应，正文是含图像链接的 Markdown，取第一个
//!   `![](url)`，退而取第一个以图像扩展名结尾的裸 URL；字节由调用方另行拉取

use base64::Engine;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::providers::chat::parse_openai_chat;
use crate::providers::{gemini_generate_path, provider_error_message, CHAT_COMPLETIONS_PATH};
use crate::request::ImageRequest;

/// 构建 Gemini 原生图像生成请求，返回 (端点路径, 请求体)
pub fn build_gemini_image(req: &ImageRequest) -> (String, Value) {
    (
        gemini_generate_path(&req.model),
        json!({
            "contents": [
                {"parts": [{"text": req.prompt}]}
            ]
        }),
    )
}

/// 构建聊天式图像生成请求（非 Gemini 模型）
pub fn build_chat_image(req: &ImageRequest) -> (String, Value) {
    (
        CHAT_COMPLETIONS_PATH.to_string(),
        json!({
            "model": req.model,
            "messages": [
                {"role": "user", "content": format!("Generate an image: {}", req.prompt)}
            ],
            "temperature": 0.7
        }),
    )
}

// ==================== Gemini 内联数据提取策略 ====================

/// 策略 1：标准位置 candidates[0].content.parts[0].inlineData.data
fn extract_standard(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/inlineData/data")
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// 策略 2：穷举所有 candidates 的所有 parts（供应商不保证槽位）
fn extract_exhaustive(body: &Value) -> Option<String> {
    let candidates = body.get("candidates")?.as_array()?;
    for candidate in candidates {
        let parts = candidate.get("content")?.get("parts")?.as_array()?;
        for part in parts {
            if let Some(data) = part
                .get("inlineData")
                .and_then(|d| d.get("data"))
                .and_then(|v| v.as_str())
            {
                return Some(data.to_string());
            }
        }
    }
    None
}

/// 按顺序尝试的提取策略表
const EXTRACTION_STRATEGIES: &[fn(&Value) -> Option<String>] =
    &[extract_standard, extract_exhaustive];

/// 解析 Gemini 图像响应为图像字节
///
/// 所有策略落空时：供应商报错对象 → Fatal（消息可行动）；
/// 否则形状未知 → Parse（附响应片段）。绝不静默返回空结果。
pub fn parse_gemini_image(raw_body: &str) -> Result<Vec<u8>, ApiError> {
    let body: Value = serde_json::from_str(raw_body)
        .map_err(|e| ApiError::parse(format!("invalid json: {}", e), raw_body))?;

    let encoded = EXTRACTION_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(&body));

    let encoded = match encoded {
        Some(data) => data,
        None => {
            if let Some(msg) = provider_error_message(&body) {
                return Err(ApiError::Fatal(format!("API error: {}", msg)));
            }
            return Err(ApiError::parse("no inlineData found in any part", raw_body));
        }
    };

    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ApiError::parse(format!("inlineData is not valid base64: {}", e), raw_body))
}

// ==================== 聊天式响应的图像链接提取 ====================

/// 从 Markdown 正文提取图像 URL
///
/// 先取第一个 `![...](url)`，再退到第一个以已知图像扩展名结尾的裸 URL。
pub fn extract_image_url(content: &str) -> Option<String> {
    if let Some(url) = Regex::new(r"!\[[^\]]*\]\((https?://[^\)]+)\)")
        .ok()
        .and_then(|re| re.captures(content).map(|c| c[1].to_string()))
    {
        return Some(url);
    }

    Regex::new(r"(https?://[^\s\)]+\.(?:png|jpg|jpeg|webp)[^\s\)]*)")
        .ok()
        .and_then(|re| re.captures(content).map(|c| c[1].to_string()))
}

/// 解析聊天式图像响应，返回图像 URL（字节由调用方拉取）
pub fn parse_chat_image(raw_body: &str) -> Result<String, ApiError> {
    let content = parse_openai_chat(raw_body)?;
    extract_image_url(&content)
        .ok_or_else(|| ApiError::parse("no image url in chat content", &content))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_B64: &str = "iVBORw0KGgo=";

    #[test]
    fn test_standard_location() {
        let raw = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"image/png","data":"{}"}}}}]}}}}]}}"#,
            PNG_B64
        );
        let bytes = parse_gemini_image(&raw).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_exhaustive_search_second_candidate_third_part() {
        // 图像藏在 candidates[1].content.parts[2]，首槽位只有文本
        let raw = format!(
            r#"{{"candidates":[
                {{"content":{{"parts":[{{"text":"here is your image"}}]}}}},
                {{"content":{{"parts":[{{"text":"a"}},{{"text":"b"}},{{"inlineData":{{"data":"{}"}}}}]}}}}
            ]}}"#,
            PNG_B64
        );
        assert!(parse_gemini_image(&raw).is_ok());
    }

    #[test]
    fn test_provider_error_vs_unknown_shape() {
        let err = parse_gemini_image(r#"{"error":{"message":"model overloaded"}}"#).unwrap_err();
        match err {
            ApiError::Fatal(msg) => assert!(msg.contains("model overloaded")),
            other => panic!("expected Fatal, got {:?}", other),
        }

        let err = parse_gemini_image(r#"{"candidates":[{"content":{"parts":[{"text":"no image"}]}}]}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::Parse { .. }));
    }

    #[test]
    fn test_invalid_base64_is_parse_error() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"inlineData":{"data":"!!!"}}]}}]}"#;
        assert!(matches!(
            parse_gemini_image(raw),
            Err(ApiError::Parse { .. })
        ));
    }

    #[test]
    fn test_markdown_url_extraction() {
        let content = "给你生成的图：![竹林](https://cdn.example.com/a/b.png) 希望喜欢";
        assert_eq!(
            extract_image_url(content).as_deref(),
            Some("https://cdn.example.com/a/b.png")
        );
    }

    #[test]
    fn test_bare_url_fallback() {
        let content = "image ready: https://cdn.example.com/xyz.jpeg?sig=123 enjoy";
        assert_eq!(
            extract_image_url(content).as_deref(),
            Some("https://cdn.example.com/xyz.jpeg?sig=123")
        );
        assert_eq!(extract_image_url("no links here"), None);
    }

    #[test]
    fn test_parse_chat_image() {
        let raw = r#"{"choices":[{"message":{"content":"![img](https://x.io/1.webp)"}}]}"#;
        assert_eq!(parse_chat_image(raw).unwrap(), "https://x.io/1.webp");

        let raw = r#"{"choices":[{"message":{"content":"抱歉，我无法生成图像"}}]}"#;
        assert!(matches!(parse_chat_image(raw), Err(ApiError::Parse { .. })));
    }
}
