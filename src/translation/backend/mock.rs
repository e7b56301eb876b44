//! 可编排的模拟后端
//!
//! 不需要网络即可驱动整个管道：
//! - 默认把 `[i] text` 翻译为 `[i] {prefix}text`
//! - 可预置一串应答（成功文本或错误），按调用顺序消费
//! - 可按请求内容注入延迟，用来打乱批次完成顺序
//! - 记录每次调用的时刻与请求
//!
//! ```ignore
//! let model = MockModel::new()
//!     .with_prefix("fr:")
//!     .with_script(vec![Err(TranslationError::http_status(503, "busy"))]);
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CompletionRequest, LanguageModel, RequestPurpose};
use crate::translation::error::{TranslationError, TranslationResult};

type DelayFn = Box<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub request: CompletionRequest,
}

/// 模拟后端
pub struct MockModel {
    prefix: String,
    script: Mutex<VecDeque<TranslationResult<String>>>,
    fail_all: Option<TranslationError>,
    context_reply: Option<String>,
    delay: Option<DelayFn>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            prefix: "T:".to_string(),
            script: Mutex::new(VecDeque::new()),
            fail_all: None,
            context_reply: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 默认译文前缀
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// 预置应答，翻译类请求按顺序消费，用完后回到默认行为
    pub fn with_script(self, replies: Vec<TranslationResult<String>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
        self
    }

    /// 所有翻译类请求都返回该错误
    pub fn failing(mut self, error: TranslationError) -> Self {
        self.fail_all = Some(error);
        self
    }

    /// 上下文分析请求的应答，未设置时返回错误
    pub fn with_context_reply(mut self, reply: &str) -> Self {
        self.context_reply = Some(reply.to_string());
        self
    }

    /// 按请求计算应答前的延迟
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// 全部调用记录
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// 指定用途的调用记录
    pub fn calls_for(&self, purpose: RequestPurpose) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.request.purpose == purpose)
            .collect()
    }

    /// 默认译文：逐行保留 `[i]` 标记并在文本前加前缀
    pub fn echo(&self, prompt: &str) -> String {
        prompt
            .lines()
            .map(|line| match line.split_once("] ") {
                Some((tag, text)) if tag.starts_with('[') => {
                    format!("{}] {}{}", tag, self.prefix, text)
                }
                _ => format!("{}{}", self.prefix, line),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn record(&self, request: &CompletionRequest) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                at: Instant::now(),
                request: request.clone(),
            });
        }
    }

    fn next_scripted(&self) -> Option<TranslationResult<String>> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, request: &CompletionRequest) -> TranslationResult<String> {
        self.record(request);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }

        if request.purpose == RequestPurpose::Context {
            return self
                .context_reply
                .clone()
                .ok_or_else(|| TranslationError::http_status(404, "context analysis not scripted"));
        }

        if let Some(reply) = self.next_scripted() {
            return reply;
        }

        if let Some(error) = &self.fail_all {
            return Err(error.clone());
        }

        Ok(self.echo(&request.prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, purpose: RequestPurpose) -> CompletionRequest {
        CompletionRequest {
            api_key: "k".into(),
            model_id: "m".into(),
            system: String::new(),
            prompt: prompt.into(),
            purpose,
        }
    }

    #[tokio::test]
    async fn test_echo_keeps_markers() {
        let model = MockModel::new().with_prefix("fr:");
        let reply = model
            .complete(&request("[0] Hello\n[1] World", RequestPurpose::Batch))
            .await
            .unwrap();

        assert_eq!(reply, "[0] fr:Hello\n[1] fr:World");
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let model = MockModel::new().with_script(vec![
            Err(TranslationError::http_status(503, "busy")),
            Ok("[0] scripted".into()),
        ]);
        let req = request("[0] Hi", RequestPurpose::Batch);

        assert!(model.complete(&req).await.unwrap_err().is_retryable());
        assert_eq!(model.complete(&req).await.unwrap(), "[0] scripted");
        assert_eq!(model.complete(&req).await.unwrap(), "[0] T:Hi");
    }

    #[tokio::test]
    async fn test_context_requests_are_separate() {
        let model = MockModel::new().with_script(vec![Ok("[0] kept".into())]);

        assert!(model
            .complete(&request("sample", RequestPurpose::Context))
            .await
            .is_err());
        assert_eq!(
            model
                .complete(&request("[0] x", RequestPurpose::Batch))
                .await
                .unwrap(),
            "[0] kept"
        );
        assert_eq!(model.calls_for(RequestPurpose::Context).len(), 1);
    }
}
