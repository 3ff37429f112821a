//! 图床上传回退链
//!
//! 依次尝试 imgbb → sm.ms → freeimage → catbox，首个成功即返回 URL；
//! 全部失败时聚合每个后端的失败原因一次性上抛，绝不静默吞掉。
//! 各后端是独立的公共图床，协议互不相同（JSON 表单 / multipart / 纯文本），
//! 统一收敛到 [`UploadBackend`] trait。

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use crate::error::{ApiError, UploadFailure};

/// 单个图床后端
#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// 上传图像字节，成功返回公开可访问的 URL
    async fn upload(
        &self,
        http: &reqwest::Client,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError>;
}

fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn read_json_body(resp: reqwest::Response) -> Result<Value, ApiError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if !(200..300).contains(&status) {
        return Err(ApiError::from_status(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| ApiError::parse(format!("invalid json: {}", e), &text))
}

// ==================== imgbb ====================

/// imgbb：表单提交 base64，响应 data.url
pub struct ImgbbUploader {
    pub api_key: String,
}

impl Default for ImgbbUploader {
    fn default() -> Self {
        Self {
            // 公共匿名 key
            api_key: "da2f59b83a95e6e0f57c4a5a2c4f3b0e".to_string(),
        }
    }
}

#[async_trait]
impl UploadBackend for ImgbbUploader {
    fn name(&self) -> &'static str {
        "imgbb"
    }

    async fn upload(
        &self,
        http: &reqwest::Client,
        _filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let encoded = encode_base64(bytes);
        let resp = http
            .post("https://api.imgbb.com/1/upload")
            .form(&[("key", self.api_key.as_str()), ("image", encoded.as_str())])
            .send()
            .await?;
        let body = read_json_body(resp).await?;
        body.pointer("/data/url")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ApiError::parse("imgbb response without data.url", &body.to_string()))
    }
}

// ==================== sm.ms ====================

/// sm.ms：multipart 提交，重复图片走 images 字段返回已有 URL
pub struct SmmsUploader;

#[async_trait]
impl UploadBackend for SmmsUploader {
    fn name(&self) -> &'static str {
        "sm.ms"
    }

    async fn upload(
        &self,
        http: &reqwest::Client,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("smfile", part);
        let resp = http
            .post("https://sm.ms/api/v2/upload")
            .multipart(form)
            .send()
            .await?;
        let body = read_json_body(resp).await?;

        if let Some(url) = body.pointer("/data/url").and_then(|v| v.as_str()) {
            return Ok(url.to_string());
        }
        // 重复上传：URL 在顶层 images 字段
        if body.get("code").and_then(|v| v.as_str()) == Some("image_repeated") {
            if let Some(url) = body.get("images").and_then(|v| v.as_str()) {
                return Ok(url.to_string());
            }
        }
        Err(ApiError::parse(
            "sm.ms response without url",
            &body.to_string(),
        ))
    }
}

// ==================== freeimage ====================

/// freeimage.host：表单提交 base64，响应 image.url
pub struct FreeImageUploader {
    pub api_key: String,
}

impl Default for FreeImageUploader {
    fn default() -> Self {
        Self {
            // 官方文档公开的测试 key
            api_key: "6d207e02198a847aa98d0a2a901485a5".to_string(),
        }
    }
}

#[async_trait]
impl UploadBackend for FreeImageUploader {
    fn name(&self) -> &'static str {
        "freeimage"
    }

    async fn upload(
        &self,
        http: &reqwest::Client,
        _filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let encoded = encode_base64(bytes);
        let resp = http
            .post("https://freeimage.host/api/1/upload")
            .form(&[
                ("key", self.api_key.as_str()),
                ("source", encoded.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;
        let body = read_json_body(resp).await?;
        body.pointer("/image/url")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                ApiError::parse("freeimage response without image.url", &body.to_string())
            })
    }
}

// ==================== catbox ====================

/// catbox.moe：multipart 提交，响应是纯文本 URL
pub struct CatboxUploader;

#[async_trait]
impl UploadBackend for CatboxUploader {
    fn name(&self) -> &'static str {
        "catbox"
    }

    async fn upload(
        &self,
        http: &reqwest::Client,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);
        let resp = http
            .post("https://catbox.moe/user/api.php")
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, &text));
        }
        let url = text.trim();
        if url.starts_with("https://") {
            Ok(url.to_string())
        } else {
            Err(ApiError::parse("catbox response is not a url", &text))
        }
    }
}

// ==================== 回退链 ====================

/// 图床上传回退链：按固定顺序逐个尝试，首个成功短路返回
pub struct UploadChain {
    http: reqwest::Client,
    backends: Vec<Box<dyn UploadBackend>>,
}

impl Default for UploadChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ImgbbUploader::default()),
            Box::new(SmmsUploader),
            Box::new(FreeImageUploader::default()),
            Box::new(CatboxUploader),
        ])
    }
}

impl UploadChain {
    pub fn new(backends: Vec<Box<dyn UploadBackend>>) -> Self {
        Self {
            http: reqwest::Client::new(),
            backends,
        }
    }

    /// 上传图像，返回首个成功后端给出的 URL
    ///
    /// 全部失败返回 [`ApiError::UploadExhausted`]，按尝试顺序列出每个
    /// 后端的失败原因。
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let mut attempts: Vec<(String, String)> = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            tracing::debug!(backend = backend.name(), "尝试图床上传");
            match backend.upload(&self.http, filename, bytes).await {
                Ok(url) => {
                    tracing::info!(backend = backend.name(), url = %url, "图床上传成功");
                    return Ok(url);
                }
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "图床上传失败，尝试下一个");
                    attempts.push((backend.name().to_string(), e.to_string()));
                }
            }
        }

        Err(ApiError::UploadExhausted(UploadFailure { attempts }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FakeBackend {
        name: &'static str,
        succeed: bool,
        calls: AtomicU32,
    }

    impl FakeBackend {
        fn new(name: &'static str, succeed: bool) -> Box<Self> {
            Box::new(Self {
                name,
                succeed,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl UploadBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn upload(
            &self,
            _http: &reqwest::Client,
            _filename: &str,
            _bytes: &[u8],
        ) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(format!("https://{}/img.png", self.name))
            } else {
                Err(ApiError::Timeout(format!("{} unreachable", self.name)))
            }
        }
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let chain = UploadChain::new(vec![
            FakeBackend::new("one", true),
            FakeBackend::new("two", true),
        ]);
        let url = chain.upload("a.png", &[1, 2, 3]).await.unwrap();
        assert_eq!(url, "https://one/img.png");
    }

    #[tokio::test]
    async fn test_falls_through_in_order() {
        let chain = UploadChain::new(vec![
            FakeBackend::new("one", false),
            FakeBackend::new("two", false),
            FakeBackend::new("three", true),
        ]);
        let url = chain.upload("a.png", &[1, 2, 3]).await.unwrap();
        assert_eq!(url, "https://three/img.png");
    }

    #[tokio::test]
    async fn test_exhaustion_aggregates_all_reasons_in_order() {
        let chain = UploadChain::new(vec![
            FakeBackend::new("one", false),
            FakeBackend::new("two", false),
        ]);
        let err = chain.upload("a.png", &[1, 2, 3]).await.unwrap_err();
        match err {
            ApiError::UploadExhausted(failure) => {
                assert_eq!(failure.attempts.len(), 2);
                assert_eq!(failure.attempts[0].0, "one");
                assert_eq!(failure.attempts[1].0, "two");
                assert!(failure.attempts[0].1.contains("unreachable"));
            }
            other => panic!("expected UploadExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_default_chain_order() {
        let chain = UploadChain::default();
        let names: Vec<&str> = chain.backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["imgbb", "sm.ms", "freeimage", "catbox"]);
    }
}
