//! 翻译会话
//!
//! 一次 `start_translate` 对应一个 [`Session`]，会话的全部状态都在这里，
//! 以引用传给各个阶段：
//!
//! 1. 收集文本，排除上一次未还原会话已经改写过的节点
//! 2. 批量查询缓存，区分命中与新文本
//! 3. 新文本占比过高时整页重新翻译
//! 4. 分块写入缓存命中，同时进行上下文分析
//! 5. 新文本切分批次，由调度器并发翻译，经有序队列写回
//!
//! 标题翻译与正文管道并发进行。所有 future 都在同一个任务上运行。

use std::cell::RefCell;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use tokio_util::sync::CancellationToken;

use super::progress::{preview, ProgressReporter, ProgressStatus, SessionState};
use super::title::translate_title;
use crate::translation::backend::LanguageModel;
use crate::translation::config::constants;
use crate::translation::error::{helpers::log_error, TranslationError};
use crate::translation::pipeline::apply::{apply_in_chunks, AppliedChunk};
use crate::translation::pipeline::context::analyze_context;
use crate::translation::pipeline::prompts::translation_system_prompt;
use crate::translation::pipeline::{
    ApplyContext, ApplyQueue, BatchBoard, CollectorConfig, OriginalTextRecord, RetryPolicy,
    Scheduler, SchedulerHooks, TextCollector, TextUnit,
};
use crate::translation::storage::ContentCache;

/// 单次会话的参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub api_key: String,
    pub model_id: String,
    pub target_language: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub use_cache: bool,
    pub retry: RetryPolicy,
    pub apply_chunk_size: usize,
    pub progress_tick: Duration,
    pub analyze_context: bool,
    pub max_text_length: usize,
}

/// 缓存分类结果
#[derive(Debug, Default)]
pub struct Classification {
    pub hits: Vec<(TextUnit, String)>,
    pub misses: Vec<TextUnit>,
    /// 是否因新文本占比过高而放弃了缓存命中
    pub large_change: bool,
}

/// 按缓存查询结果分类；新文本占比达到阈值时全部视为新文本
pub fn classify(units: Vec<TextUnit>, lookups: Vec<Option<String>>) -> Classification {
    let total = units.len();
    let mut hits = Vec::new();
    let mut misses = Vec::new();

    for (unit, cached) in units.iter().zip(lookups) {
        match cached {
            Some(translation) => hits.push((unit.clone(), translation)),
            None => misses.push(unit.clone()),
        }
    }

    let large_change = !hits.is_empty()
        && total > 0
        && misses.len() as f64 / total as f64 >= constants::LARGE_CHANGE_RATIO;

    if large_change {
        return Classification {
            hits: Vec::new(),
            misses: units,
            large_change,
        };
    }

    Classification {
        hits,
        misses,
        large_change,
    }
}

/// 翻译会话
pub struct Session<'a> {
    pub(crate) root: &'a Handle,
    pub(crate) model: &'a dyn LanguageModel,
    pub(crate) cache: &'a ContentCache,
    pub(crate) record: &'a OriginalTextRecord,
    pub(crate) reporter: &'a ProgressReporter,
    pub(crate) cancel: CancellationToken,
    pub(crate) settings: SessionSettings,
    queue: ApplyQueue,
    last_error: RefCell<Option<TranslationError>>,
}

impl<'a> Session<'a> {
    pub fn new(
        root: &'a Handle,
        model: &'a dyn LanguageModel,
        cache: &'a ContentCache,
        record: &'a OriginalTextRecord,
        reporter: &'a ProgressReporter,
        cancel: CancellationToken,
        settings: SessionSettings,
    ) -> Self {
        Self {
            root,
            model,
            cache,
            record,
            reporter,
            cancel,
            settings,
            queue: ApplyQueue::new(),
            last_error: RefCell::new(None),
        }
    }

    /// 运行会话直到结束，返回最终快照
    pub async fn run(&self) -> ProgressStatus {
        self.reporter.begin_session();
        tracing::info!(
            "开始翻译会话 (模型 {}, 批次 {}, 并发 {})",
            self.settings.model_id,
            self.settings.batch_size,
            self.settings.concurrency
        );

        let units = self.harvest();
        tokio::join!(self.translate_body(units), translate_title(self));

        self.finish()
    }

    /// 收集文本，跳过已被改写的节点
    fn harvest(&self) -> Vec<TextUnit> {
        let mut collector = TextCollector::new(CollectorConfig {
            max_text_length: self.settings.max_text_length,
            ..CollectorConfig::default()
        });

        let units: Vec<TextUnit> = collector
            .collect(self.root)
            .into_iter()
            .filter(|unit| !self.record.contains(unit.node_id()))
            .collect();

        let stats = collector.get_stats();
        if stats.collected > units.len() {
            tracing::debug!(
                "{} 个节点已在之前的会话中翻译，跳过",
                stats.collected - units.len()
            );
        }

        units
    }

    async fn translate_body(&self, units: Vec<TextUnit>) {
        let total = units.len();
        self.reporter.update(|status| status.total_texts = total);
        self.reporter.push();
        if total == 0 {
            return;
        }

        let lookups = if self.settings.use_cache {
            let texts: Vec<&str> = units.iter().map(|unit| unit.text.as_str()).collect();
            self.cache.get_many(&texts)
        } else {
            vec![None; total]
        };

        let classification = classify(units, lookups);
        if classification.large_change {
            tracing::info!("新文本占比超过 {:.0}%，整页重新翻译", constants::LARGE_CHANGE_RATIO * 100.0);
        }
        tracing::info!(
            "共 {} 条文本: 缓存命中 {}, 待翻译 {}",
            total,
            classification.hits.len(),
            classification.misses.len()
        );

        let on_cached = |chunk: AppliedChunk<'_>| {
            self.reporter.update(|status| {
                status.cached_count += chunk.count;
                status.translated_count += chunk.count;
                if let Some(text) = chunk.last_translation {
                    status.preview_text = Some(preview(text));
                }
            });
        };
        let cached_context = self.apply_context(&on_cached);

        // 缓存命中的写入不等待上下文分析
        let (system_prompt, applied) = tokio::join!(
            self.system_prompt(&classification.misses),
            async {
                let applied = apply_in_chunks(&classification.hits, &cached_context, false).await;
                if applied {
                    self.reporter.push();
                }
                applied
            }
        );
        if !applied {
            return;
        }

        let board = BatchBoard::from_units(classification.misses, self.settings.batch_size);
        self.reporter.update(|status| {
            status.batch_count = board.len();
            status.batches = board.summaries();
        });
        self.reporter.push();
        if board.is_empty() {
            return;
        }

        let scheduler = Scheduler {
            model: self.model,
            board: &board,
            api_key: &self.settings.api_key,
            model_id: &self.settings.model_id,
            system_prompt: &system_prompt,
            concurrency: self.settings.concurrency,
            retry: self.settings.retry,
            cancel: &self.cancel,
        };
        let hooks = BodyHooks {
            session: self,
            board: &board,
        };

        tokio::select! {
            _ = scheduler.run(&hooks) => {}
            _ = self.reporter.tick(self.settings.progress_tick) => {}
        }

        let on_fresh = |chunk: AppliedChunk<'_>| self.record_fresh(chunk);
        self.queue.flush(&board, &self.apply_context(&on_fresh)).await;
        self.sync_board(&board);
    }

    async fn system_prompt(&self, misses: &[TextUnit]) -> String {
        let context = if self.settings.analyze_context && !misses.is_empty() && !self.cancel.is_cancelled() {
            tokio::select! {
                _ = self.cancel.cancelled() => None,
                context = analyze_context(
                    self.model,
                    &self.settings.api_key,
                    &self.settings.model_id,
                    misses,
                ) => context,
            }
        } else {
            None
        };

        translation_system_prompt(&self.settings.target_language, context.as_ref())
    }

    pub(crate) fn apply_context<'s>(
        &'s self,
        on_applied: &'s dyn Fn(AppliedChunk<'_>),
    ) -> ApplyContext<'s> {
        ApplyContext {
            record: self.record,
            cache: self.cache,
            model_id: &self.settings.model_id,
            chunk_size: self.settings.apply_chunk_size,
            cancel: &self.cancel,
            on_applied,
        }
    }

    fn record_fresh(&self, chunk: AppliedChunk<'_>) {
        self.reporter.update(|status| {
            status.translated_count += chunk.count;
            if let Some(text) = chunk.last_translation {
                status.preview_text = Some(preview(text));
            }
        });
    }

    fn sync_board(&self, board: &BatchBoard) {
        self.reporter.update(|status| {
            status.batches = board.summaries();
            status.batches_done = board.done_count();
            status.failed_batches = board.failed_count();
        });
    }

    /// 计算终态；会话期间状态已被取消或还原改写时保持不变
    fn finish(&self) -> ProgressStatus {
        if self.reporter.state() != SessionState::Translating {
            self.reporter.push();
            return self.reporter.snapshot();
        }

        let status = self.reporter.snapshot();
        if self.cancel.is_cancelled() {
            self.reporter.set_state(SessionState::Cancelled);
        } else if status.batch_count > 0 && status.failed_batches == status.batch_count {
            let reason = self
                .last_error
                .borrow()
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "未知错误".to_string());
            let message = format!("全部 {} 个批次均失败: {}", status.batch_count, reason);
            tracing::error!("{}", message);
            self.reporter.update(|status| status.error = Some(message));
            self.reporter.set_state(SessionState::Error);
        } else {
            self.reporter.set_state(SessionState::Completed);
        }

        let status = self.reporter.snapshot();
        tracing::info!(
            "翻译会话结束: {:?} (已翻译 {}/{}, 缓存 {}, 失败批次 {}, 活跃 {}ms)",
            status.state,
            status.translated_count,
            status.total_texts,
            status.cached_count,
            status.failed_batches,
            status.active_ms
        );
        status
    }
}

/// 正文调度期间的回调
struct BodyHooks<'s, 'a> {
    session: &'s Session<'a>,
    board: &'s BatchBoard,
}

#[async_trait(?Send)]
impl<'s, 'a> SchedulerHooks for BodyHooks<'s, 'a> {
    fn dispatch_started(&self, _index: usize) {
        self.session.reporter.timer().begin();
        self.session.sync_board(self.board);
        self.session.reporter.push();
    }

    fn dispatch_finished(&self, _index: usize) {
        self.session.reporter.timer().end();
    }

    async fn batch_settled(&self, index: usize, error: Option<TranslationError>) {
        if let Some(error) = error {
            let error = error.with_context(format!("批次 {}", index));
            log_error(&error);
            *self.session.last_error.borrow_mut() = Some(error);
        }
        self.session.sync_board(self.board);
        self.session.reporter.push();

        let session = self.session;
        let on_fresh = |chunk: AppliedChunk<'_>| session.record_fresh(chunk);
        session
            .queue
            .flush(self.board, &session.apply_context(&on_fresh))
            .await;
        session.reporter.push();
    }
}
