//! 语言模型后端
//!
//! 管道只通过 [`LanguageModel`] 与模型交互：一次调用发送系统指令与用户提示词，
//! 返回模型的文本输出。生产实现是兼容 OpenAI 接口的 HTTP 客户端，
//! 测试使用可编排的 [`MockModel`]。

use std::sync::Arc;

use async_trait::async_trait;

use crate::translation::error::TranslationResult;

pub mod mock;
pub mod openai;

pub use mock::{MockModel, RecordedCall};
pub use openai::OpenAiCompatibleClient;

/// 请求用途，仅用于日志和测试区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPurpose {
    /// 正文批次翻译
    Batch,
    /// 标题翻译
    Title,
    /// 行业上下文分析
    Context,
}

/// 一次模型调用
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub api_key: String,
    pub model_id: String,
    pub system: String,
    pub prompt: String,
    pub purpose: RequestPurpose,
}

/// 语言模型后端
///
/// 实现需要把传输层失败映射为 `NetworkError`，
/// 把非成功状态码映射为 `HttpStatus`，以便调度器判断是否重试。
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> TranslationResult<String>;
}

/// 共享后端，调用方可在翻译期间保留一份引用
#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> TranslationResult<String> {
        (**self).complete(request).await
    }
}
