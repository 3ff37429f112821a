//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GENFLOW__*` 覆盖（双下划线表示嵌套，
//! 如 `GENFLOW__API__BASE_URL=https://...`）。
//!
//! 凭证与 base URL 以显式 [`ApiContext`] 逐客户端传入，不做进程级单例，
//! 因此测试与生产的多套凭证可以并存互不污染。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub video: VideoSection,
    #[serde(default)]
    pub music: MusicSection,
}

/// [api] 段：凭证、网关地址与默认模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub api_key: String,
    pub base_url: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            timeout_secs: default_request_timeout(),
            model: default_chat_model(),
            image_model: default_image_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

/// [retry] 段：指数退避参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 退避基数（秒）
    #[serde(default = "default_retry_base_secs")]
    pub base_secs: u64,
    /// 抖动上限（秒）
    #[serde(default = "default_retry_jitter_secs")]
    pub jitter_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_secs: default_retry_base_secs(),
            jitter_secs: default_retry_jitter_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_secs() -> u64 {
    3
}

fn default_retry_jitter_secs() -> u64 {
    2
}

/// [poll] 段：轮询间隔与最长等待
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSection {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_timeout_secs() -> u64 {
    600
}

/// [video] 段：视频生成默认参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSection {
    #[serde(default = "default_video_model")]
    pub model: String,
    /// 宽高比（2:3, 3:2, 1:1, 16:9, 9:16）
    #[serde(default = "default_video_aspect_ratio")]
    pub aspect_ratio: String,
    /// 分辨率（720P, 1080P）
    #[serde(default = "default_video_size")]
    pub size: String,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            model: default_video_model(),
            aspect_ratio: default_video_aspect_ratio(),
            size: default_video_size(),
        }
    }
}

fn default_video_model() -> String {
    "grok-video-3-10s".to_string()
}

fn default_video_aspect_ratio() -> String {
    "3:2".to_string()
}

fn default_video_size() -> String {
    "720P".to_string()
}

/// [music] 段：Suno 默认参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MusicSection {
    #[serde(default = "default_music_model")]
    pub model: String,
    #[serde(default = "default_music_tags")]
    pub tags: String,
}

impl Default for MusicSection {
    fn default() -> Self {
        Self {
            model: default_music_model(),
            tags: default_music_tags(),
        }
    }
}

fn default_music_model() -> String {
    "chirp-v4".to_string()
}

fn default_music_tags() -> String {
    "chinese traditional,emotional".to_string()
}

/// 每次调用上下文：凭证 + 网关地址 + 超时
///
/// 显式传入 GenClient / UploadChain，不做模块级单例。
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ApiContext {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(default_request_timeout()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 拼接端点路径（base_url 已去除尾部斜杠）
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl From<&ApiSection> for ApiContext {
    fn from(section: &ApiSection) -> Self {
        ApiContext::new(section.api_key.clone(), section.base_url.clone())
            .with_timeout(Duration::from_secs(section.timeout_secs))
    }
}

/// 从 config 目录加载配置，环境变量 GENFLOW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GENFLOW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GENFLOW")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
