//! 视频生成能力：grok / veo / sora / 通用四种提交形状
//!
//! 所有模型提交到同一端点 `/v1/video/create`，模型名是请求字段而非 URL 的
//! 一部分；家族差异在字段名与图片数量上限（Sora 只收第一张参考图，且用
//! `orientation` 而非 `aspect_ratio`）。

use serde_json::{json, Value};

use crate::error::ApiError;
use crate::providers::VideoFamily;
use crate::request::VideoRequest;
use crate::task::{normalize_with_label, GenerationTask, TaskOutput, TaskState};

/// 参考图规整：URL 与 data: URI 透传，其余视为预编码 base64 包成 data URI
fn normalize_image(img: &str) -> String {
    if img.starts_with("http://") || img.starts_with("https://") || img.starts_with("data:") {
        img.to_string()
    } else {
        format!("data:image/jpeg;base64,{}", img)
    }
}

/// 构建视频提交请求体（端点固定为 /v1/video/create）
pub fn build_video_submit(req: &VideoRequest) -> Value {
    let images: Vec<String> = req.image_urls.iter().map(|i| normalize_image(i)).collect();

    match VideoFamily::resolve(&req.model) {
        VideoFamily::Grok => json!({
            "model": req.model,
            "prompt": req.prompt,
            "images": images,
            "aspect_ratio": req.aspect_ratio,
            "size": req.size,
        }),
        VideoFamily::Veo => json!({
            "model": req.model,
            "images": images,
            "prompt": req.prompt,
            "enhance_prompt": req.enhance_prompt,
            "aspect_ratio": req.aspect_ratio,
        }),
        // Sora 只接受一张参考图
        VideoFamily::Sora => json!({
            "model": req.model,
            "images": images.into_iter().take(1).collect::<Vec<_>>(),
            "prompt": req.prompt,
            "orientation": req.orientation,
            "duration": req.duration,
            "watermark": req.watermark,
        }),
        VideoFamily::Generic => json!({
            "model": req.model,
            "images": images,
            "prompt": req.prompt,
        }),
    }
}

/// 把一次状态查询响应套用到上一个任务快照，得到新快照
///
/// 完成态时长取值顺序：`duration` → `video_duration` →
/// `completed_at - submitted_at`（最后一条是估算，clock 漂移下不可靠，
/// 以 `duration_estimated = true` 标记给调用方）。
pub fn apply_video_status(prev: &GenerationTask, body: &Value) -> Result<GenerationTask, ApiError> {
    let raw_status = body
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let (state, sub_label) = normalize_with_label(raw_status);

    match state {
        TaskState::Completed => {
            let url = body
                .get("video_url")
                .or_else(|| body.get("url"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ApiError::parse("completed video without video_url", &body.to_string())
                })?;

            let explicit = body
                .get("duration")
                .or_else(|| body.get("video_duration"))
                .and_then(|v| v.as_f64());

            let (duration, estimated) = match explicit {
                Some(d) => (Some(d), false),
                None => {
                    let fallback = body
                        .get("completed_at")
                        .and_then(|v| v.as_f64())
                        .and_then(|completed| {
                            let submitted = prev.submitted_at?.timestamp() as f64;
                            let diff = completed - submitted;
                            (diff > 0.0).then_some(diff)
                        });
                    (fallback, fallback.is_some())
                }
            };

            Ok(prev.complete(TaskOutput::Video {
                url: url.to_string(),
                duration,
                duration_estimated: estimated,
            }))
        }
        TaskState::Failed => {
            let reason = body
                .get("fail_reason")
                .or_else(|| body.get("error"))
                .or_else(|| body.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or(raw_status);
            Ok(prev.fail(reason))
        }
        TaskState::Cancelled => Ok(prev.observe_state(TaskState::Cancelled, sub_label)),
        other => Ok(prev.observe_state(other, sub_label)),
    }
}
