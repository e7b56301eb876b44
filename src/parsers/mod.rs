//! # 解析器模块
//!
//! HTML 文档解析、DOM 操作与序列化。翻译管道只依赖这里暴露的 DOM 辅助函数。
//!
//! # 模块组织
//!
//! - `html` - HTML文档解析、DOM操作、元数据处理

pub mod html;

// Re-export commonly used items for convenience
pub use html::{get_charset, get_title, html_to_dom, serialize_document, title_text_node};
