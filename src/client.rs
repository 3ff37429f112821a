//! 统一网关客户端
//!
//! 所有供应商能力经同一个 OpenAI 兼容网关转发：鉴权统一为 Bearer，
//! 端点按能力固定。同步能力（聊天 / 图像）直接返回结果；异步能力
//! （视频 / 音乐 / MJ）提交后返回任务快照，状态查询走 [`fetch_status`]。
//! 每次网络调用都包在重试执行器里。
//!
//! [`fetch_status`]: GenClient::fetch_status

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ApiContext;
use crate::error::ApiError;
use crate::poll::StatusSource;
use crate::providers::chat::{
    build_gemini_chat, build_openai_chat, parse_gemini_chat, parse_openai_chat, SamplingDefaults,
};
use crate::providers::image::{
    build_chat_image, build_gemini_image, parse_chat_image, parse_gemini_image,
};
use crate::providers::mj::{
    apply_mj_status, build_action, build_blend, build_describe, build_imagine, build_upload,
    parse_upload_result,
};
use crate::providers::music::{
    apply_lyrics_status, apply_music_status, build_batch_fetch, build_lyrics_submit,
    build_music_submit, split_batch_response, unwrap_task_envelope,
};
use crate::providers::video::{apply_video_status, build_video_submit};
use crate::providers::{
    extract_task_id, mj_fetch_path, music_fetch_path, ChatFamily, TaskKind, LYRICS_SUBMIT_PATH,
    MJ_ACTION_PATH, MJ_BLEND_PATH, MJ_DESCRIBE_PATH, MJ_IMAGINE_PATH, MJ_UPLOAD_PATH,
    MUSIC_FETCH_BATCH_PATH, MUSIC_SUBMIT_PATH, VIDEO_CREATE_PATH, VIDEO_QUERY_PATH,
};
use crate::request::{ChatRequest, GenerationRequest, ImageRequest};
use crate::retry::{self, RetryPolicy};
use crate::task::GenerationTask;

/// 图像生成结果：字节已取回；聊天式路径额外带原始链接
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub source_url: Option<String>,
}

/// 异步请求对应的任务类别；同步能力（聊天 / 图像）返回 None
pub fn task_kind_of(req: &GenerationRequest) -> Option<TaskKind> {
    match req {
        GenerationRequest::Chat(_) | GenerationRequest::ImageGenerate(_) => None,
        GenerationRequest::VideoGenerate(_) => Some(TaskKind::Video),
        GenerationRequest::MusicGenerate(_) => Some(TaskKind::Music),
        GenerationRequest::Lyrics(_) => Some(TaskKind::Lyrics),
        GenerationRequest::MjImagine(_)
        | GenerationRequest::MjAction(_)
        | GenerationRequest::MjBlend(_)
        | GenerationRequest::MjDescribe(_) => Some(TaskKind::Mj),
    }
}

/// 统一网关客户端
pub struct GenClient {
    http: reqwest::Client,
    ctx: ApiContext,
    retry: RetryPolicy,
    sampling: SamplingDefaults,
    cancel: Option<CancellationToken>,
}

impl GenClient {
    pub fn new(ctx: ApiContext) -> Self {
        // 超时逐请求设置，不会因 builder 失败被悄悄丢掉
        Self {
            http: reqwest::Client::new(),
            ctx,
            retry: RetryPolicy::default(),
            sampling: SamplingDefaults::default(),
            cancel: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingDefaults) -> Self {
        self.sampling = sampling;
        self
    }

    /// 协作式取消：标志置位后不再发起新的尝试，不抢占在途请求
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn context(&self) -> &ApiContext {
        &self.ctx
    }

    // ==================== HTTP 基础 ====================

    async fn post_raw(&self, path: &str, body: &Value) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(self.ctx.endpoint(path))
            .timeout(self.ctx.timeout)
            .bearer_auth(&self.ctx.api_key)
            .json(body)
            .send()
            .await?;
        Self::read_body(resp).await
    }

    async fn get_raw(&self, path: &str) -> Result<String, ApiError> {
        let resp = self
            .http
            .get(self.ctx.endpoint(path))
            .timeout(self.ctx.timeout)
            .bearer_auth(&self.ctx.api_key)
            .send()
            .await?;
        Self::read_body(resp).await
    }

    async fn read_body(resp: reqwest::Response) -> Result<String, ApiError> {
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, &text));
        }
        Ok(text)
    }

    fn to_json(raw: &str) -> Result<Value, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::parse(format!("invalid json: {}", e), raw))
    }

    /// 带重试的 POST，返回 JSON
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let raw = retry::execute(&self.retry, self.cancel.as_ref(), || {
            self.post_raw(path, body)
        })
        .await?;
        Self::to_json(&raw)
    }

    /// 带重试的 GET，返回 JSON
    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let raw = retry::execute(&self.retry, self.cancel.as_ref(), || self.get_raw(path)).await?;
        Self::to_json(&raw)
    }

    // ==================== 同步能力 ====================

    /// 聊天补全；模型名前缀决定 wire 家族
    pub async fn chat(&self, req: &ChatRequest) -> Result<String, ApiError> {
        let family = ChatFamily::resolve(&req.model);
        let (path, body) = match family {
            ChatFamily::OpenAiCompatible => build_openai_chat(req, self.sampling),
            ChatFamily::GeminiNative => build_gemini_chat(req, self.sampling),
        };
        tracing::debug!(model = %req.model, family = ?family, "发起聊天请求");

        let path = path.as_str();
        let body = &body;
        let raw = retry::execute(&self.retry, self.cancel.as_ref(), || {
            self.post_raw(path, body)
        })
        .await?;

        match family {
            ChatFamily::OpenAiCompatible => parse_openai_chat(&raw),
            ChatFamily::GeminiNative => parse_gemini_chat(&raw),
        }
    }

    /// 图像生成，统一返回已取回的图像字节
    ///
    /// Gemini 原生响应内联 base64；聊天式响应只给链接，需要再发一次
    /// GET 把字节拉回来。
    pub async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, ApiError> {
        let family = ChatFamily::resolve(&req.model);
        let (path, body) = match family {
            ChatFamily::GeminiNative => build_gemini_image(req),
            ChatFamily::OpenAiCompatible => build_chat_image(req),
        };
        tracing::debug!(model = %req.model, family = ?family, "发起图像生成请求");

        let path = path.as_str();
        let body = &body;
        let raw = retry::execute(&self.retry, self.cancel.as_ref(), || {
            self.post_raw(path, body)
        })
        .await?;

        match family {
            ChatFamily::GeminiNative => Ok(GeneratedImage {
                bytes: parse_gemini_image(&raw)?,
                source_url: None,
            }),
            ChatFamily::OpenAiCompatible => {
                let url = parse_chat_image(&raw)?;
                let bytes = self.fetch_bytes(&url).await?;
                Ok(GeneratedImage {
                    bytes,
                    source_url: Some(url),
                })
            }
        }
    }

    /// 从绝对 URL 拉取字节（CDN 链接，不带鉴权）
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let http = &self.http;
        let timeout = self.ctx.timeout;
        retry::execute(&self.retry, self.cancel.as_ref(), move || async move {
            let resp = http.get(url).timeout(timeout).send().await?;
            let status = resp.status().as_u16();
            if !(200..300).contains(&status) {
                return Err(ApiError::from_status(status, url));
            }
            Ok(resp.bytes().await?.to_vec())
        })
        .await
    }

    // ==================== 异步能力 ====================

    /// 提交异步生成任务，返回初始任务快照
    ///
    /// 同步能力（聊天 / 图像）没有任务 ID，提交即拒绝。
    pub async fn submit(&self, req: &GenerationRequest) -> Result<GenerationTask, ApiError> {
        let (path, body) = match req {
            GenerationRequest::Chat(_) | GenerationRequest::ImageGenerate(_) => {
                return Err(ApiError::Fatal(format!(
                    "capability {} is synchronous, call it directly",
                    req.capability()
                )));
            }
            GenerationRequest::VideoGenerate(r) => (VIDEO_CREATE_PATH, build_video_submit(r)),
            GenerationRequest::MusicGenerate(r) => (MUSIC_SUBMIT_PATH, build_music_submit(r)),
            GenerationRequest::Lyrics(r) => (LYRICS_SUBMIT_PATH, build_lyrics_submit(r)),
            GenerationRequest::MjImagine(r) => (MJ_IMAGINE_PATH, build_imagine(r)),
            GenerationRequest::MjAction(r) => (MJ_ACTION_PATH, build_action(r)),
            GenerationRequest::MjBlend(r) => (MJ_BLEND_PATH, build_blend(r)?),
            GenerationRequest::MjDescribe(r) => (MJ_DESCRIBE_PATH, build_describe(r)),
        };

        tracing::info!(capability = req.capability(), "提交异步生成任务");
        let response = self.post_json(path, &body).await?;
        let task_id = extract_task_id(&response)?;
        tracing::info!(capability = req.capability(), task_id = %task_id, "任务已提交");
        Ok(GenerationTask::submitted(task_id))
    }

    /// 查询一次任务状态，把响应套用到上一个快照
    pub async fn fetch_status(
        &self,
        kind: TaskKind,
        prev: &GenerationTask,
    ) -> Result<GenerationTask, ApiError> {
        match kind {
            TaskKind::Video => {
                let path = format!("{}?id={}", VIDEO_QUERY_PATH, prev.task_id);
                let body = self.get_json(&path).await?;
                apply_video_status(prev, &body)
            }
            TaskKind::Music => {
                let body = self.get_json(&music_fetch_path(&prev.task_id)).await?;
                apply_music_status(prev, unwrap_task_envelope(&body))
            }
            TaskKind::Lyrics => {
                let body = self.get_json(&music_fetch_path(&prev.task_id)).await?;
                apply_lyrics_status(prev, unwrap_task_envelope(&body))
            }
            TaskKind::Mj => {
                let body = self.get_json(&mj_fetch_path(&prev.task_id)).await?;
                apply_mj_status(prev, &body)
            }
        }
    }

    /// 批量查询音乐任务状态（一次 POST 查多个 ID）
    ///
    /// 响应中缺席的任务保持原快照不变。
    pub async fn fetch_music_status_batch(
        &self,
        prevs: &[GenerationTask],
    ) -> Result<Vec<GenerationTask>, ApiError> {
        let ids: Vec<String> = prevs.iter().map(|t| t.task_id.clone()).collect();
        let body = self
            .post_json(MUSIC_FETCH_BATCH_PATH, &build_batch_fetch(&ids))
            .await?;
        let by_id = split_batch_response(&body);

        prevs
            .iter()
            .map(|prev| {
                match by_id.iter().find(|(id, _)| *id == prev.task_id) {
                    Some((_, info)) => apply_music_status(prev, info),
                    None => Ok(prev.clone()),
                }
            })
            .collect()
    }

    /// 任务状态源（给轮询器用）
    pub fn status_source(&self, kind: TaskKind) -> ApiStatusSource<'_> {
        ApiStatusSource { client: self, kind }
    }

    // ==================== 辅助 ====================

    /// 把本地图片上传到 MJ 的 Discord 图床，返回可贴进 prompt 的 URL
    pub async fn upload_mj_image(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let body = build_upload(filename, bytes);
        let response = self.post_json(MJ_UPLOAD_PATH, &body).await?;
        parse_upload_result(&response)
    }

    /// 下载产物到本地文件，返回写入的字节数
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<u64, ApiError> {
        let bytes = self.fetch_bytes(url).await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ApiError::Fatal(format!("写入文件失败 {}: {}", dest.display(), e)))?;
        tracing::info!(url, dest = %dest.display(), size = bytes.len(), "产物已下载");
        Ok(bytes.len() as u64)
    }
}

/// 把客户端的状态查询包成轮询器可用的状态源
pub struct ApiStatusSource<'a> {
    client: &'a GenClient,
    kind: TaskKind,
}

#[async_trait]
impl StatusSource for ApiStatusSource<'_> {
    async fn fetch(&self, prev: &GenerationTask) -> Result<GenerationTask, ApiError> {
        self.client.fetch_status(self.kind, prev).await
    }
}
