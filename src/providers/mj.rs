//! Midjourney 能力：imagine / action / blend / describe 与任务查询
//!
//! 提交响应信封是 `{code, description, result}`，result 为任务 ID；
//! 任务查询端点 `/mj/task/{id}/fetch`，进度为 "45%" 形式的字符串，
//! 完成后 `buttons` 数组携带可执行的后续操作（U1-U4 / V1-V4 / 重绘等）。

use base64::Engine;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::request::{MjActionRequest, MjBlendRequest, MjDescribeRequest, MjImagineRequest};
use crate::task::{normalize_with_label, GenerationTask, MjButton, TaskOutput, TaskState};

/// 构建 imagine 请求体
pub fn build_imagine(req: &MjImagineRequest) -> Value {
    let mut payload = json!({
        "prompt": req.prompt,
        "botType": req.bot_type,
    });
    if !req.ref_images.is_empty() {
        payload["base64Array"] = json!(req.ref_images);
    }
    payload
}

/// 构建 action 请求体（按下已有任务的某个按钮）
pub fn build_action(req: &MjActionRequest) -> Value {
    json!({
        "taskId": req.task_id,
        "customId": req.custom_id,
    })
}

/// 构建 blend 请求体；图片数量必须在 2-5 张之间
pub fn build_blend(req: &MjBlendRequest) -> Result<Value, ApiError> {
    if req.images.len() < 2 || req.images.len() > 5 {
        return Err(ApiError::Fatal(format!(
            "blend requires 2-5 images, got {}",
            req.images.len()
        )));
    }
    Ok(json!({
        "base64Array": req.images,
        "dimensions": req.dimensions.as_str(),
    }))
}

/// 构建 describe 请求体（图转文）
pub fn build_describe(req: &MjDescribeRequest) -> Value {
    json!({ "base64": req.image })
}

/// 按文件扩展名推断 MIME 类型；未知扩展按 png 处理
fn mime_from_filename(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

/// 构建 Discord 图床上传请求体（文件字节 → data URI 数组）
pub fn build_upload(filename: &str, bytes: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let data_uri = format!("data:{};base64,{}", mime_from_filename(filename), encoded);
    json!({ "base64Array": [data_uri] })
}

/// 解析 Discord 上传响应，返回可贴进 prompt 的图片 URL
pub fn parse_upload_result(body: &Value) -> Result<String, ApiError> {
    let url = match body.get("result") {
        Some(Value::Array(items)) => items.first().and_then(|v| v.as_str()),
        Some(Value::String(s)) => Some(s.as_str()),
        _ => body.get("url").and_then(|v| v.as_str()),
    };
    match url {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(ApiError::parse(
            "upload response without url",
            &body.to_string(),
        )),
    }
}

fn parse_buttons(body: &Value) -> Vec<MjButton> {
    body.get("buttons")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let custom_id = item.get("customId").and_then(|v| v.as_str())?;
                    (!custom_id.is_empty()).then(|| MjButton {
                        custom_id: custom_id.to_string(),
                        label: item
                            .get("label")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        emoji: item
                            .get("emoji")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 把一次 MJ 任务查询响应套用到上一个快照
pub fn apply_mj_status(prev: &GenerationTask, body: &Value) -> Result<GenerationTask, ApiError> {
    let raw_status = body
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("NOT_START");
    let (state, sub_label) = normalize_with_label(raw_status);
    let progress = body
        .get("progress")
        .and_then(|v| v.as_str())
        .map(String::from);

    match state {
        TaskState::Completed => {
            let url = body
                .get("imageUrl")
                .and_then(|v| v.as_str())
                .filter(|u| !u.is_empty());
            let output = match url {
                Some(url) => TaskOutput::MjImage {
                    url: url.to_string(),
                    buttons: parse_buttons(body),
                },
                // describe 任务没有出图，结果是 prompt 里的描述文本
                None => {
                    let text = body
                        .get("prompt")
                        .or_else(|| body.get("promptEn"))
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty());
                    match text {
                        Some(text) => TaskOutput::Text(text.to_string()),
                        None => {
                            return Err(ApiError::parse(
                                "completed mj task without imageUrl or prompt",
                                &body.to_string(),
                            ));
                        }
                    }
                }
            };
            let mut next = prev.complete(output);
            next.progress = progress;
            Ok(next)
        }
        TaskState::Failed => {
            let reason = body
                .get("failReason")
                .and_then(|v| v.as_str())
                .unwrap_or(raw_status);
            Ok(prev.fail(reason))
        }
        other => {
            let mut next = prev.observe_state(other, sub_label);
            next.progress = progress;
            Ok(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::request::BlendDimensions;
    use crate::task::MjActionKind;

    use super::*;

    #[test]
    fn test_imagine_payload() {
        let body = build_imagine(&MjImagineRequest::new("ancient chinese garden --v 7"));
        assert_eq!(body["prompt"], "ancient chinese garden --v 7");
        assert_eq!(body["botType"], "MID_JOURNEY");
        assert!(body.get("base64Array").is_none());

        let body = build_imagine(
            &MjImagineRequest::new("cat")
                .with_ref_images(vec!["data:image/png;base64,eA==".to_string()])
                .with_bot_type("NIJI_JOURNEY"),
        );
        assert_eq!(body["botType"], "NIJI_JOURNEY");
        assert_eq!(body["base64Array"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_blend_image_count_validation() {
        let one = MjBlendRequest {
            images: vec!["a".to_string()],
            dimensions: BlendDimensions::Square,
        };
        assert!(matches!(build_blend(&one), Err(ApiError::Fatal(_))));

        let three = MjBlendRequest {
            images: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            dimensions: BlendDimensions::Landscape,
        };
        let body = build_blend(&three).unwrap();
        assert_eq!(body["dimensions"], "LANDSCAPE");
        assert_eq!(body["base64Array"].as_array().unwrap().len(), 3);

        let six = MjBlendRequest {
            images: (0..6).map(|i| i.to_string()).collect(),
            dimensions: BlendDimensions::Portrait,
        };
        assert!(build_blend(&six).is_err());
    }

    #[test]
    fn test_upload_payload_mime_sniffing() {
        let body = build_upload("photo.JPG", &[0xff, 0xd8]);
        let uri = body["base64Array"][0].as_str().unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let body = build_upload("noext", &[1, 2, 3]);
        assert!(body["base64Array"][0]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_parse_upload_result_shapes() {
        assert_eq!(
            parse_upload_result(&serde_json::json!({"result": ["https://cdn/x.png"]})).unwrap(),
            "https://cdn/x.png"
        );
        assert_eq!(
            parse_upload_result(&serde_json::json!({"result": "https://cdn/y.png"})).unwrap(),
            "https://cdn/y.png"
        );
        assert!(parse_upload_result(&serde_json::json!({"code": 1})).is_err());
    }

    #[test]
    fn test_in_progress_keeps_progress_string() {
        let prev = GenerationTask::submitted("mj1");
        let body = serde_json::json!({"status": "IN_PROGRESS", "progress": "45%"});
        let next = apply_mj_status(&prev, &body).unwrap();
        assert_eq!(next.state, TaskState::Processing);
        assert_eq!(next.progress.as_deref(), Some("45%"));
    }

    #[test]
    fn test_success_with_buttons() {
        let prev = GenerationTask::submitted("mj1");
        let body = serde_json::json!({
            "status": "SUCCESS",
            "progress": "100%",
            "imageUrl": "https://cdn/grid.png",
            "buttons": [
                {"customId": "MJ::JOB::upsample::1::abc", "label": "U1", "emoji": ""},
                {"customId": "MJ::JOB::variation::1::abc", "label": "V1", "emoji": ""},
                {"customId": "MJ::JOB::reroll::0::abc", "label": "", "emoji": "🔄"}
            ]
        });
        let next = apply_mj_status(&prev, &body).unwrap();
        match next.output {
            Some(TaskOutput::MjImage {
                ref url,
                ref buttons,
            }) => {
                assert_eq!(url, "https://cdn/grid.png");
                assert_eq!(buttons.len(), 3);
                assert_eq!(buttons[0].action_kind(), MjActionKind::Upscale);
                assert_eq!(buttons[2].display_name(), "🔄");
            }
            ref other => panic!("expected mj output, got {:?}", other),
        }
    }

    #[test]
    fn test_describe_success_yields_text_without_image() {
        // describe 任务完成时没有 imageUrl，描述文本在 prompt 里
        let prev = GenerationTask::submitted("mj-desc");
        let body = serde_json::json!({
            "status": "SUCCESS",
            "progress": "100%",
            "imageUrl": "",
            "prompt": "1️⃣ 水墨风格的山水画 --ar 3:2"
        });
        let next = apply_mj_status(&prev, &body).unwrap();
        assert_eq!(next.state, TaskState::Completed);
        match next.output {
            Some(TaskOutput::Text(ref text)) => assert!(text.contains("水墨")),
            ref other => panic!("expected text output, got {:?}", other),
        }
    }

    #[test]
    fn test_success_without_url_or_prompt_is_parse_error() {
        let prev = GenerationTask::submitted("mj1");
        let body = serde_json::json!({"status": "SUCCESS", "imageUrl": "", "prompt": ""});
        assert!(matches!(
            apply_mj_status(&prev, &body),
            Err(ApiError::Parse { .. })
        ));
    }

    #[test]
    fn test_failure_reason() {
        let prev = GenerationTask::submitted("mj1");
        let body = serde_json::json!({"status": "FAILURE", "failReason": "Banned prompt detected"});
        let next = apply_mj_status(&prev, &body).unwrap();
        assert_eq!(next.state, TaskState::Failed);
        assert_eq!(next.error.as_deref(), Some("Banned prompt detected"));
    }
}
