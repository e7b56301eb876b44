//! 翻译模块
//!
//! 提供完整的网页翻译功能，采用清晰的模块化架构：
//! - **backend**: 语言模型后端（OpenAI 兼容接口与测试用模拟后端）
//! - **core**: 翻译服务、会话、标题翻译、进度上报与命令通道
//! - **pipeline**: 文本处理管道（收集、批次、调度、有序应用）
//! - **storage**: 内容寻址的译文缓存
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use page_translator::translation::{
//!     ConfigManager, ContentCache, OpenAiCompatibleClient, PageTranslator, StartOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load(None)?.into_config();
//! let dom = page_translator::html_to_dom(b"<title>Hi</title><p>Hello</p>", "utf-8")?;
//!
//! let translator = PageTranslator::new(
//!     dom.document.clone(),
//!     Box::new(OpenAiCompatibleClient::from_config(&config)?),
//!     ContentCache::from_config(&config),
//!     config,
//! );
//! let status = translator.start_translate(StartOptions::new("sk-...")).await?;
//! println!("{:?}: {}", status.state, status.translated_title.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 语言模型后端
pub mod backend;

/// 配置管理模块 - 处理翻译相关的所有配置
pub mod config;

/// 核心模块 - 翻译服务与会话
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 文本处理管道模块 - 文本收集、批次与调度
pub mod pipeline;

/// 存储管理模块 - 译文缓存
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use backend::{CompletionRequest, LanguageModel, OpenAiCompatibleClient, RequestPurpose};
pub use config::{constants, ConfigManager, TranslationConfig};
pub use core::{
    serve, Command, PageTranslator, ProgressStatus, Request, Response, SessionState, StartOptions,
};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use storage::{CacheStatus, ContentCache};

/// 检查翻译配置文件是否存在
pub fn config_file_exists() -> bool {
    config::config_file_exists()
}
