//! 页面翻译服务
//!
//! [`PageTranslator`] 持有一份文档以及跨会话存活的状态：
//! 原文记录、进度上报器、缓存和语言模型后端。外部通过它的方法
//! （或 `commands` 模块的命令通道）启动、取消、还原翻译并查询状态。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use page_translator::translation::{PageTranslator, StartOptions, TranslationConfig};
//! use page_translator::translation::backend::OpenAiCompatibleClient;
//! use page_translator::translation::storage::ContentCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TranslationConfig::default();
//! let dom = page_translator::html_to_dom(b"<p>Hello</p>", "utf-8")?;
//! let translator = PageTranslator::new(
//!     dom.document.clone(),
//!     Box::new(OpenAiCompatibleClient::from_config(&config)?),
//!     ContentCache::from_config(&config),
//!     config,
//! );
//!
//! let status = translator.start_translate(StartOptions::new("sk-...")).await?;
//! println!("translated {} of {}", status.translated_count, status.total_texts);
//! # Ok(())
//! # }
//! ```

use std::cell::{Cell, RefCell};

use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressReporter, ProgressStatus, SessionState};
use super::session::{Session, SessionSettings};
use crate::translation::backend::LanguageModel;
use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::helpers::{config_error, state_error};
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::{OriginalTextRecord, RetryPolicy};
use crate::translation::storage::{CacheStatus, ContentCache};

/// 启动翻译的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    pub api_key: String,
    /// 为空时使用配置中的模型
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_batch_size() -> usize {
    constants::DEFAULT_BATCH_SIZE
}

fn default_concurrency() -> usize {
    constants::DEFAULT_CONCURRENCY
}

fn default_use_cache() -> bool {
    true
}

impl StartOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            use_cache: default_use_cache(),
        }
    }

    /// 以配置中的批次大小与并发数为默认值
    pub fn from_config(config: &TranslationConfig, api_key: impl Into<String>) -> Self {
        Self {
            model_id: Some(config.model_id.clone()),
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            ..Self::new(api_key)
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    fn validate(&self) -> TranslationResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(config_error("API 密钥不能为空"));
        }
        if self.batch_size == 0 {
            return Err(config_error("批次大小不能为0"));
        }
        if self.concurrency == 0 {
            return Err(config_error("并发数不能为0"));
        }
        Ok(())
    }
}

/// 页面翻译服务
pub struct PageTranslator {
    root: Handle,
    model: Box<dyn LanguageModel>,
    cache: ContentCache,
    config: TranslationConfig,
    record: OriginalTextRecord,
    reporter: ProgressReporter,
    cancel: RefCell<Option<CancellationToken>>,
    session_running: Cell<bool>,
}

impl PageTranslator {
    /// 创建翻译服务
    ///
    /// `root` 通常是 `RcDom::document`。
    pub fn new(
        root: Handle,
        model: Box<dyn LanguageModel>,
        cache: ContentCache,
        config: TranslationConfig,
    ) -> Self {
        Self {
            root,
            model,
            cache,
            config,
            record: OriginalTextRecord::new(),
            reporter: ProgressReporter::new(),
            cancel: RefCell::new(None),
            session_running: Cell::new(false),
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 连接进度观察者
    pub fn attach_observer(&self, observer: UnboundedSender<ProgressStatus>) {
        self.reporter.attach_observer(observer);
    }

    pub fn detach_observer(&self) {
        self.reporter.detach_observer();
    }

    /// 启动翻译并等待会话结束，返回最终快照
    ///
    /// 正在翻译时再次启动返回 `InvalidState`。
    pub async fn start_translate(&self, options: StartOptions) -> TranslationResult<ProgressStatus> {
        if self.reporter.state() == SessionState::Translating || self.session_running.get() {
            return Err(state_error("翻译正在进行中"));
        }
        options.validate()?;

        let cancel = CancellationToken::new();
        *self.cancel.borrow_mut() = Some(cancel.clone());
        self.session_running.set(true);

        let session = Session::new(
            &self.root,
            self.model.as_ref(),
            &self.cache,
            &self.record,
            &self.reporter,
            cancel,
            self.session_settings(&options),
        );
        let status = session.run().await;

        self.session_running.set(false);
        self.cancel.borrow_mut().take();
        Ok(status)
    }

    fn session_settings(&self, options: &StartOptions) -> SessionSettings {
        SessionSettings {
            api_key: options.api_key.clone(),
            model_id: options
                .model_id
                .clone()
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| self.config.model_id.clone()),
            target_language: self.config.target_language.clone(),
            batch_size: options.batch_size,
            concurrency: options.concurrency,
            use_cache: options.use_cache,
            retry: RetryPolicy::from(&self.config),
            apply_chunk_size: self.config.apply_chunk_size,
            progress_tick: self.config.progress_tick(),
            analyze_context: self.config.analyze_context,
            max_text_length: self.config.max_text_length,
        }
    }

    /// 取消正在进行的翻译
    ///
    /// 返回是否有会话被取消。已写入文档的译文保持不变。
    pub fn cancel_translation(&self, reason: &str) -> bool {
        if self.reporter.state() != SessionState::Translating {
            return false;
        }

        if let Some(cancel) = self.cancel.borrow().as_ref() {
            cancel.cancel();
        }

        tracing::info!("翻译已取消: {}", reason);
        self.reporter
            .update(|status| status.cancel_reason = Some(reason.to_string()));
        self.reporter.set_state(SessionState::Cancelled);
        true
    }

    /// 还原全部原文，返回还原的节点数
    ///
    /// 翻译进行中时先取消会话。
    pub fn restore_original(&self) -> TranslationResult<usize> {
        let state = self.reporter.state();
        if state == SessionState::Inactive && self.record.is_empty() {
            return Err(state_error("没有可还原的翻译"));
        }
        if state == SessionState::Translating {
            self.cancel_translation("restore");
        }

        let restored = self.record.restore_all();
        tracing::info!("已还原 {} 个节点", restored);

        self.reporter
            .update(|status| status.translated_title = None);
        self.reporter.set_state(SessionState::Restored);
        Ok(restored)
    }

    /// 当前快照
    pub fn get_state(&self) -> ProgressStatus {
        self.reporter.snapshot()
    }

    pub fn get_translated_title(&self) -> Option<String> {
        self.reporter.snapshot().translated_title
    }

    pub fn get_cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// 清空缓存
    ///
    /// 缓存记录不区分来源域名，因此清空全部记录。
    pub fn clear_cache_for_domain(&self) -> TranslationResult<()> {
        self.cache.clear()?;
        tracing::info!("翻译缓存已清空");
        Ok(())
    }

    /// 被改写过的节点数
    pub fn translated_node_count(&self) -> usize {
        self.record.len()
    }
}
