//! # Page Translator Library
//!
//! 把网页可见文本通过大语言模型翻译为目标语言，缓存译文，并可按需精确还原原文。
//!
//! ## 模块组织
//!
//! - `env` - 类型安全的环境变量
//! - `parsers` - HTML 解析、DOM 辅助函数与序列化
//! - `translation` - 翻译管道（收集、缓存、批次调度、有序应用、进度上报）

pub mod env;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::html::{html_to_dom, serialize_document};
pub use translation::{PageTranslator, ProgressStatus, SessionState, StartOptions};
