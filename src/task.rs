//! 任务状态机与状态归一化
//!
//! 各供应商的状态词表互不相同（Suno 用 NOT_START/SUCCESS，Veo 视频管线带
//! image_downloading / video_upsampling 等子状态），统一收敛到封闭的
//! [`TaskState`] 枚举。未知字符串一律归为 `Pending`，绝不归为终态，
//! 保证任务不会被误报为已完成。
//!
//! [`GenerationTask`] 是不可变快照：每次状态观察返回新值，终态粘滞，
//! 时间戳只设置一次且只向前。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 统一任务状态（封闭枚举）
///
/// 流转：Pending → Submitted → Queued → Processing → {Completed | Failed | Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Submitted,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// 终态：到达后不再变化
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// 统一状态名（小写），normalize 的逆方向
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Submitted => "submitted",
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

/// 供应商状态字符串 → 统一状态（全函数，不抛错，幂等）
///
/// 1. 统一状态名精确匹配（大小写不敏感，`-` 视同 `_`）
/// 2. 已知供应商词表查表（Suno 词表、Veo 子状态、`*_completed` / `*_failed` 后缀）
/// 3. 其余默认 `Pending`
pub fn normalize(raw_status: &str) -> TaskState {
    normalize_with_label(raw_status).0
}

/// 归一化并保留子状态标签
///
/// 映射进 `Processing` 的管线子状态（如 video_upsampling）对控制流等价于
/// Processing，但原始词对用户有信息量，作为标签透出。
pub fn normalize_with_label(raw_status: &str) -> (TaskState, Option<String>) {
    let key = raw_status.trim().to_lowercase().replace('-', "_");

    // 统一状态名精确匹配
    let canonical = match key.as_str() {
        "pending" => Some(TaskState::Pending),
        "submitted" => Some(TaskState::Submitted),
        "queued" => Some(TaskState::Queued),
        "processing" => Some(TaskState::Processing),
        "completed" => Some(TaskState::Completed),
        "failed" => Some(TaskState::Failed),
        "cancelled" | "canceled" => Some(TaskState::Cancelled),
        _ => None,
    };
    if let Some(state) = canonical {
        return (state, None);
    }

    // 已知供应商词表
    let mapped = match key.as_str() {
        // Suno 词表
        "not_start" => Some(TaskState::Pending),
        "in_progress" => Some(TaskState::Processing),
        "success" => Some(TaskState::Completed),
        "failure" | "error" => Some(TaskState::Failed),
        // Veo 视频管线子状态
        "image_downloading" | "video_generating" | "video_upsampling" => {
            Some(TaskState::Processing)
        }
        _ => None,
    };
    if let Some(state) = mapped {
        return (state, Some(raw_status.trim().to_string()));
    }

    // 多阶段管线的阶段性终态后缀
    if key.ends_with("_completed") {
        return (TaskState::Completed, Some(raw_status.trim().to_string()));
    }
    if key.ends_with("_failed") {
        return (TaskState::Failed, Some(raw_status.trim().to_string()));
    }

    // 未知词：归为 Pending，绝不归为终态
    (TaskState::Pending, None)
}

/// 任务产物（仅成功终态存在）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutput {
    /// 聊天 / 歌词等纯文本
    Text(String),
    /// 已取回的图像字节（source_url 为供应商给出的原始链接，内联数据则为空）
    ImageBytes {
        bytes: Vec<u8>,
        source_url: Option<String>,
    },
    /// 视频链接；duration_estimated 表示时长来自 completed_at - submit_time 的估算
    Video {
        url: String,
        duration: Option<f64>,
        duration_estimated: bool,
    },
    /// 音乐片段（Suno 一次产出多个）
    Music { clips: Vec<MusicClip> },
    /// Midjourney 出图 + 可执行的后续操作按钮
    MjImage { url: String, buttons: Vec<MjButton> },
}

/// 单个音乐片段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MusicClip {
    pub id: String,
    pub title: String,
    /// 纯音频 URL
    pub audio_url: Option<String>,
    /// 带封面的视频 URL
    pub video_url: Option<String>,
    /// 封面图片 URL
    pub cover_url: Option<String>,
    /// 时长（秒）
    pub duration: Option<f64>,
}

/// MJ 操作按钮（如 U1/V1/重绘）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MjButton {
    /// 如 "MJ::JOB::upsample::1::xxxxx"
    pub custom_id: String,
    /// 如 "U1", "V1"
    pub label: String,
    pub emoji: String,
}

/// 按钮操作类别（从 custom_id 推断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjActionKind {
    Upscale,
    Variation,
    Reroll,
    Pan,
    Zoom,
    Unknown,
}

impl MjButton {
    pub fn action_kind(&self) -> MjActionKind {
        let id = self.custom_id.to_lowercase();
        if id.contains("upsample") {
            MjActionKind::Upscale
        } else if id.contains("variation") {
            MjActionKind::Variation
        } else if id.contains("reroll") {
            MjActionKind::Reroll
        } else if id.contains("pan") {
            MjActionKind::Pan
        } else if id.contains("zoom") {
            MjActionKind::Zoom
        } else {
            MjActionKind::Unknown
        }
    }

    /// 显示名：优先 label，其次 emoji，再退到 custom_id 截断
    pub fn display_name(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        if !self.emoji.is_empty() {
            return self.emoji.clone();
        }
        self.custom_id.chars().take(20).collect()
    }
}

/// 生成任务快照（值类型）
///
/// 由提交调用创建、提交方独占持有；编排层不跨调用保留任务。
/// 状态观察返回新快照而非原地修改，并发读者不会看到半更新的任务。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    /// 供应商分配的不透明任务 ID
    pub task_id: String,
    pub state: TaskState,
    /// 管线子状态标签（如 "video_upsampling"），仅供展示
    pub sub_label: Option<String>,
    /// 进度字符串（MJ 返回 "45%" 这类）
    pub progress: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 仅成功终态存在
    pub output: Option<TaskOutput>,
    /// 仅失败终态存在
    pub error: Option<String>,
}

impl GenerationTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            sub_label: None,
            progress: None,
            submitted_at: None,
            started_at: None,
            finished_at: None,
            output: None,
            error: None,
        }
    }

    /// 提交成功后的初始快照（submitted_at 立即落定）
    pub fn submitted(task_id: impl Into<String>) -> Self {
        Self::new(task_id).observe_state(TaskState::Submitted, None)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 观察到新状态，返回新快照
    ///
    /// 终态粘滞：已到达终态的任务对后续观察保持不变。
    pub fn observe_state(&self, state: TaskState, sub_label: Option<String>) -> Self {
        self.observe_state_at(state, sub_label, Utc::now())
    }

    /// 同上，显式传入观察时刻（时间戳只设置一次、只向前）
    pub fn observe_state_at(
        &self,
        state: TaskState,
        sub_label: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        if self.state.is_terminal() {
            return self.clone();
        }

        let mut next = self.clone();
        next.state = state;
        next.sub_label = sub_label;

        // submitted_at 在首次离开 Pending 时落定
        if state != TaskState::Pending && next.submitted_at.is_none() {
            next.submitted_at = Some(now);
        }
        if state == TaskState::Processing && next.started_at.is_none() {
            next.started_at = Some(now);
        }
        if state.is_terminal() && next.finished_at.is_none() {
            next.finished_at = Some(now);
        }
        next
    }

    /// 成功终态快照
    pub fn complete(&self, output: TaskOutput) -> Self {
        let mut next = self.observe_state(TaskState::Completed, None);
        if next.state == TaskState::Completed {
            next.output = Some(output);
        }
        next
    }

    /// 失败终态快照
    pub fn fail(&self, error: impl Into<String>) -> Self {
        let mut next = self.observe_state(TaskState::Failed, None);
        if next.state == TaskState::Failed {
            next.error = Some(error.into());
        }
        next
    }

    /// 从提交到完成（或当前）的耗时（秒）
    pub fn elapsed_secs(&self) -> Option<f64> {
        let submitted = self.submitted_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - submitted).num_milliseconds() as f64 / 1000.0)
    }
}
