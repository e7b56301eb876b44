//! 批次调度器
//!
//! 在当前任务上并发运行 `min(concurrency, batch_count)` 个工作者 future。
//! 每个工作者反复领取下一个未领取的批次，发出一次后端请求（含重试），
//! 写回结果后通知会话。取消在领取前和每次请求前检查；
//! 已发出的请求不会被中断，其结果在应用阶段被丢弃。

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use super::batch::{BatchBoard, BatchResult};
use super::prompts::{build_batch_prompt, parse_batch_response};
use crate::translation::backend::{CompletionRequest, LanguageModel, RequestPurpose};
use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationError;

/// 重试策略：第 n 次失败后等待 `base × factor^(n−1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(constants::DEFAULT_RETRY_BASE_DELAY_MS),
            factor: constants::DEFAULT_RETRY_FACTOR,
        }
    }
}

impl From<&TranslationConfig> for RetryPolicy {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            base_delay: config.retry_base_delay(),
            factor: config.retry_factor.max(1),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次（从 1 开始）失败后的等待时间
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(exponent))
    }
}

/// 一次带重试的请求的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success(String),
    Failed(TranslationError),
    Cancelled,
}

/// 发送请求，可重试错误按策略退避重试
pub async fn dispatch_with_retry(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }

        attempt += 1;
        let error = match model.complete(request).await {
            Ok(text) => return DispatchOutcome::Success(text),
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::warn!("{:?} 请求失败（不可重试）: {}", request.purpose, error);
            return DispatchOutcome::Failed(error);
        }
        if attempt >= policy.max_attempts {
            tracing::warn!(
                "{:?} 请求失败，已尝试 {} 次: {}",
                request.purpose,
                attempt,
                error
            );
            return DispatchOutcome::Failed(error);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            "{:?} 请求失败，{}ms后重试 (尝试 {}/{}): {}",
            request.purpose,
            delay.as_millis(),
            attempt + 1,
            policy.max_attempts,
            error
        );

        tokio::select! {
            _ = cancel.cancelled() => return DispatchOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// 会话对调度事件的回调
#[async_trait(?Send)]
pub trait SchedulerHooks {
    /// 一个批次开始请求
    fn dispatch_started(&self, index: usize);

    /// 一个批次的请求结束（成功、失败或放弃）
    fn dispatch_finished(&self, index: usize);

    /// 批次结果已写回看板
    async fn batch_settled(&self, index: usize, error: Option<TranslationError>);
}

/// 调度器的请求参数
pub struct Scheduler<'a> {
    pub model: &'a dyn LanguageModel,
    pub board: &'a BatchBoard,
    pub api_key: &'a str,
    pub model_id: &'a str,
    pub system_prompt: &'a str,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub cancel: &'a CancellationToken,
}

impl Scheduler<'_> {
    /// 实际启动的工作者数量
    pub fn worker_count(&self) -> usize {
        self.concurrency.max(1).min(self.board.len())
    }

    /// 运行全部工作者，直到所有批次被领取并处理完，或会话被取消
    pub async fn run(&self, hooks: &dyn SchedulerHooks) {
        let workers = self.worker_count();
        tracing::debug!("启动 {} 个工作者处理 {} 个批次", workers, self.board.len());

        join_all((0..workers).map(|worker| self.run_worker(worker, hooks))).await;
    }

    async fn run_worker(&self, worker: usize, hooks: &dyn SchedulerHooks) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(index) = self.board.claim() else {
                break;
            };

            let texts = self.board.texts(index);
            let request = CompletionRequest {
                api_key: self.api_key.to_string(),
                model_id: self.model_id.to_string(),
                system: self.system_prompt.to_string(),
                prompt: build_batch_prompt(&texts),
                purpose: RequestPurpose::Batch,
            };

            tracing::debug!("工作者 {} 处理批次 {} ({} 条)", worker, index, texts.len());
            hooks.dispatch_started(index);
            let outcome = dispatch_with_retry(self.model, &request, &self.retry, self.cancel).await;
            hooks.dispatch_finished(index);

            match outcome {
                DispatchOutcome::Success(response) => {
                    let translations = parse_batch_response(&response, texts.len());
                    self.board.settle(index, BatchResult::Ready(translations));
                    hooks.batch_settled(index, None).await;
                }
                DispatchOutcome::Failed(error) => {
                    self.board.settle(index, BatchResult::Failed);
                    hooks.batch_settled(index, Some(error)).await;
                }
                DispatchOutcome::Cancelled => {
                    self.board.settle(index, BatchResult::Failed);
                    hooks.batch_settled(index, None).await;
                    break;
                }
            }
        }
    }
}
