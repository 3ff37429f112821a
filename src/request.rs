//! 统一生成请求：按能力划分的带标签联合
//!
//! 调用方只构造这里的统一参数，供应商差异（字段名、图片数量上限、端点）
//! 由 providers 层在构建 wire 请求时消化。

use serde::{Deserialize, Serialize};

/// 生成请求（按能力的可辨识联合）
#[derive(Debug, Clone)]
pub enum GenerationRequest {
    Chat(ChatRequest),
    ImageGenerate(ImageRequest),
    VideoGenerate(VideoRequest),
    MusicGenerate(MusicRequest),
    Lyrics(LyricsRequest),
    MjImagine(MjImagineRequest),
    MjAction(MjActionRequest),
    MjBlend(MjBlendRequest),
    MjDescribe(MjDescribeRequest),
}

impl GenerationRequest {
    /// 能力名（日志用）
    pub fn capability(&self) -> &'static str {
        match self {
            GenerationRequest::Chat(_) => "chat",
            GenerationRequest::ImageGenerate(_) => "image_generate",
            GenerationRequest::VideoGenerate(_) => "video_generate",
            GenerationRequest::MusicGenerate(_) => "music_generate",
            GenerationRequest::Lyrics(_) => "lyrics",
            GenerationRequest::MjImagine(_) => "mj_imagine",
            GenerationRequest::MjAction(_) => "mj_action",
            GenerationRequest::MjBlend(_) => "mj_blend",
            GenerationRequest::MjDescribe(_) => "mj_describe",
        }
    }
}

/// 聊天消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 聊天请求：模型名前缀决定 wire 家族（gemini-* 走 Gemini 原生格式）
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system_prompt: None,
            temperature: None,
            top_p: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// 图像生成请求
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
}

impl ImageRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// 视频生成请求（统一参数，按模型前缀展开为各家 wire 形状）
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    /// 参考图：URL、data: URI 或预编码 base64
    pub image_urls: Vec<String>,
    /// 宽高比（2:3, 3:2, 1:1, 16:9, 9:16）—— Grok/Veo 使用
    pub aspect_ratio: String,
    /// 分辨率（720P, 1080P）—— Grok 使用
    pub size: String,
    /// 时长（秒）—— Sora 使用
    pub duration: u32,
    /// 提示词增强 —— Veo 使用
    pub enhance_prompt: bool,
    /// 水印 —— Sora 使用
    pub watermark: bool,
    /// 方向（landscape / portrait）—— Sora 使用
    pub orientation: String,
}

impl VideoRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            image_urls: Vec::new(),
            aspect_ratio: "3:2".to_string(),
            size: "720P".to_string(),
            duration: 5,
            enhance_prompt: false,
            watermark: false,
            orientation: "landscape".to_string(),
        }
    }

    pub fn with_images(mut self, image_urls: Vec<String>) -> Self {
        self.image_urls = image_urls;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_orientation(mut self, orientation: impl Into<String>) -> Self {
        self.orientation = orientation.into();
        self
    }

    pub fn with_enhance_prompt(mut self, enhance: bool) -> Self {
        self.enhance_prompt = enhance;
        self
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }
}

/// 人声性别（Suno）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocalGender {
    Male,
    Female,
}

impl VocalGender {
    pub fn as_str(self) -> &'static str {
        match self {
            VocalGender::Male => "m",
            VocalGender::Female => "f",
        }
    }
}

/// 音乐创作模式
#[derive(Debug, Clone)]
pub enum MusicMode {
    /// 自定义 / 灵感模式（歌词或描述直接生成）
    Custom,
    /// 续写：从原片段的指定秒数继续
    Extend { clip_id: String, continue_at: f64 },
    /// 翻唱：基于已有片段重新演绎
    Cover {
        clip_id: String,
        infill_start_s: Option<f64>,
        infill_end_s: Option<f64>,
    },
}

/// 音乐生成请求（Suno）
#[derive(Debug, Clone)]
pub struct MusicRequest {
    /// 歌词内容或描述
    pub prompt: String,
    /// 风格标签（逗号分隔）
    pub tags: String,
    pub title: String,
    /// 排除风格（逗号分隔）
    pub negative_tags: String,
    /// 模型版本（chirp-v5 / chirp-v4 / chirp-v3-5 / chirp-v3-5-tau）
    pub model: String,
    pub vocal_gender: Option<VocalGender>,
    pub mode: MusicMode,
    /// 任务完成回调 URL
    pub notify_hook: Option<String>,
}

impl MusicRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tags: "chinese traditional,emotional".to_string(),
            title: String::new(),
            negative_tags: String::new(),
            model: "chirp-v4".to_string(),
            vocal_gender: None,
            mode: MusicMode::Custom,
            notify_hook: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn with_negative_tags(mut self, tags: impl Into<String>) -> Self {
        self.negative_tags = tags.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_vocal_gender(mut self, gender: VocalGender) -> Self {
        self.vocal_gender = Some(gender);
        self
    }

    pub fn with_mode(mut self, mode: MusicMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_notify_hook(mut self, hook: impl Into<String>) -> Self {
        self.notify_hook = Some(hook.into());
        self
    }
}

/// 歌词生成请求
#[derive(Debug, Clone)]
pub struct LyricsRequest {
    /// 主题或关键词（如 "爱情, 夏天, 思念"）
    pub prompt: String,
}

impl LyricsRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// MJ Imagine 请求
#[derive(Debug, Clone)]
pub struct MjImagineRequest {
    pub prompt: String,
    /// 垫图：URL 或 base64 data URI
    pub ref_images: Vec<String>,
    /// MID_JOURNEY 或 NIJI_JOURNEY
    pub bot_type: String,
}

impl MjImagineRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ref_images: Vec::new(),
            bot_type: "MID_JOURNEY".to_string(),
        }
    }

    pub fn with_ref_images(mut self, images: Vec<String>) -> Self {
        self.ref_images = images;
        self
    }

    pub fn with_bot_type(mut self, bot_type: impl Into<String>) -> Self {
        self.bot_type = bot_type.into();
        self
    }
}

/// MJ Action 请求（对已有任务按下某个按钮）
#[derive(Debug, Clone)]
pub struct MjActionRequest {
    pub task_id: String,
    pub custom_id: String,
}

/// MJ Blend 融合请求（2-5 张图）
#[derive(Debug, Clone)]
pub struct MjBlendRequest {
    pub images: Vec<String>,
    pub dimensions: BlendDimensions,
}

/// Blend 输出比例
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendDimensions {
    /// 2:3
    Portrait,
    /// 1:1
    Square,
    /// 3:2
    Landscape,
}

impl BlendDimensions {
    pub fn as_str(self) -> &'static str {
        match self {
            BlendDimensions::Portrait => "PORTRAIT",
            BlendDimensions::Square => "SQUARE",
            BlendDimensions::Landscape => "LANDSCAPE",
        }
    }
}

/// MJ Describe 请求（图转文）
#[derive(Debug, Clone)]
pub struct MjDescribeRequest {
    /// 图片 base64 或 URL
    pub image: String,
}
