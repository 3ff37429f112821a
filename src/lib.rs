//! Genflow - AI 生成任务编排层
//!
//! 多供应商生成能力（聊天 / 图像 / 视频 / 音乐 / Midjourney）经同一个
//! OpenAI 兼容网关统一接入。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与调用上下文
//! - **error**: 错误类型与失败分类（重试决策的依据）
//! - **retry**: 重试执行器（指数退避 + 抖动 + 协作式取消）
//! - **task**: 任务状态机、状态归一化与不可变任务快照
//! - **request**: 按能力划分的统一生成请求
//! - **providers**: 协议适配（统一请求 ↔ 各供应商 wire 格式）
//! - **client**: 网关客户端（同步能力直返，异步能力提交 + 状态查询）
//! - **poll**: 轮询编排（单任务 / 批量，超时与取消）
//! - **upload**: 图床上传回退链（imgbb → sm.ms → freeimage → catbox）

pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod poll;
pub mod providers;
pub mod request;
pub mod retry;
pub mod task;
pub mod upload;

pub use client::{GenClient, GeneratedImage};
pub use config::{ApiContext, AppConfig};
pub use error::ApiError;
pub use poll::{poll, poll_batch, PollOptions, StatusSource};
pub use request::GenerationRequest;
pub use retry::RetryPolicy;
pub use task::{GenerationTask, TaskState};
pub use upload::UploadChain;
