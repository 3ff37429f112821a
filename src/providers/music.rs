//! 音乐 / 歌词能力（Suno）
//!
//! 提交固定形状 JSON（模型字段叫 `mv`），续写 / 翻唱通过 `task` 字段区分；
//! 状态词表 NOT_START / SUBMITTED / QUEUED / IN_PROGRESS / SUCCESS / FAILURE。
//! 查询响应把任务对象包在 `data` 里（有时是单元素数组），任务对象的
//! `data` 字段又是片段数组 —— 解析时逐层拆信封。

use serde_json::{json, Value};

use crate::error::ApiError;
use crate::request::{LyricsRequest, MusicMode, MusicRequest};
use crate::task::{normalize_with_label, GenerationTask, MusicClip, TaskOutput, TaskState};

/// 构建音乐提交请求体（端点 /suno/submit/music）
pub fn build_music_submit(req: &MusicRequest) -> Value {
    let mut payload = json!({
        "prompt": req.prompt,
        "tags": req.tags,
        "negative_tags": req.negative_tags,
        "mv": req.model,
        "generation_type": "TEXT",
    });

    if !req.title.is_empty() {
        payload["title"] = json!(req.title);
    }

    let mut metadata = json!({ "create_mode": "custom" });
    if let Some(gender) = req.vocal_gender {
        metadata["vocal_gender"] = json!(gender.as_str());
    }
    payload["metadata"] = metadata;

    match &req.mode {
        MusicMode::Custom => {}
        MusicMode::Extend {
            clip_id,
            continue_at,
        } => {
            payload["continue_clip_id"] = json!(clip_id);
            payload["continue_at"] = json!(continue_at);
            payload["task"] = json!("extend");
        }
        MusicMode::Cover {
            clip_id,
            infill_start_s,
            infill_end_s,
        } => {
            payload["task"] = json!("cover");
            payload["cover_clip_id"] = json!(clip_id);
            if let Some(start) = infill_start_s {
                payload["infill_start_s"] = json!(start);
            }
            if let Some(end) = infill_end_s {
                payload["infill_end_s"] = json!(end);
            }
        }
    }

    if let Some(ref hook) = req.notify_hook {
        payload["notify_hook"] = json!(hook);
    }

    payload
}

/// 构建歌词提交请求体（端点 /suno/submit/lyrics）
pub fn build_lyrics_submit(req: &LyricsRequest) -> Value {
    json!({ "prompt": req.prompt })
}

/// 批量状态查询请求体（POST /suno/fetch）
pub fn build_batch_fetch(task_ids: &[String]) -> Value {
    json!({ "ids": task_ids })
}

/// 拆查询信封：响应把任务对象放在 `data`，偶尔是单元素数组
pub fn unwrap_task_envelope(body: &Value) -> &Value {
    match body.get("data") {
        Some(Value::Array(items)) => items.first().unwrap_or(body),
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

fn parse_clip(value: &Value) -> MusicClip {
    MusicClip {
        id: value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        title: value
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        audio_url: value
            .get("audio_url")
            .and_then(|v| v.as_str())
            .map(String::from),
        video_url: value
            .get("video_url")
            .and_then(|v| v.as_str())
            .map(String::from),
        cover_url: value
            .get("image_large_url")
            .and_then(|v| v.as_str())
            .map(String::from),
        duration: value.get("duration").and_then(|v| v.as_f64()),
    }
}

/// 把音乐任务对象套用到上一个快照
///
/// `task_info` 是拆过信封的任务对象；其 `data` 字段为片段数组。
pub fn apply_music_status(
    prev: &GenerationTask,
    task_info: &Value,
) -> Result<GenerationTask, ApiError> {
    let raw_status = task_info
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("NOT_START");
    let (state, sub_label) = normalize_with_label(raw_status);

    match state {
        TaskState::Completed => {
            let clips: Vec<MusicClip> = task_info
                .get("data")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().map(parse_clip).collect())
                .unwrap_or_default();

            if clips.is_empty() {
                // SUCCESS 但没有片段：不能降级成空成功
                return Err(ApiError::parse(
                    "music task succeeded without clips",
                    &task_info.to_string(),
                ));
            }
            let mut next = prev.complete(TaskOutput::Music { clips });
            next.progress = task_info
                .get("progress")
                .and_then(|v| v.as_str())
                .map(String::from);
            Ok(next)
        }
        TaskState::Failed => {
            let reason = task_info
                .get("failReason")
                .or_else(|| task_info.get("fail_reason"))
                .and_then(|v| v.as_str())
                .unwrap_or(raw_status);
            Ok(prev.fail(reason))
        }
        other => Ok(prev.observe_state(other, sub_label)),
    }
}

/// 歌词任务完成时的文本提取：`data` 是 `{text: "..."}` 或直接字符串
pub fn apply_lyrics_status(
    prev: &GenerationTask,
    task_info: &Value,
) -> Result<GenerationTask, ApiError> {
    let raw_status = task_info
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("NOT_START");
    let (state, sub_label) = normalize_with_label(raw_status);

    match state {
        TaskState::Completed => {
            let text = match task_info.get("data") {
                Some(Value::Object(obj)) => obj.get("text").and_then(|v| v.as_str()),
                Some(Value::String(s)) => Some(s.as_str()),
                _ => None,
            };
            match text {
                Some(text) if !text.is_empty() => {
                    Ok(prev.complete(TaskOutput::Text(text.to_string())))
                }
                _ => Err(ApiError::parse(
                    "lyrics task succeeded without text",
                    &task_info.to_string(),
                )),
            }
        }
        TaskState::Failed => {
            let reason = task_info
                .get("failReason")
                .and_then(|v| v.as_str())
                .unwrap_or(raw_status);
            Ok(prev.fail(reason))
        }
        other => Ok(prev.observe_state(other, sub_label)),
    }
}

/// 拆批量查询响应：`data` 数组按 task_id 分桶
pub fn split_batch_response(body: &Value) -> Vec<(String, Value)> {
    body.get("data")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = item.get("task_id").and_then(|v| v.as_str())?;
                    (!id.is_empty()).then(|| (id.to_string(), item.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}
