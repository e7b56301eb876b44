//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作
//! - `metadata`: 文档元数据（字符集、标题）
//! - `serializer`: 序列化功能

pub mod dom;
pub mod metadata;
pub mod serializer;

pub use dom::{
    find_nodes, get_node_attr, get_node_name, html_to_dom, set_text_content,
    text_content,
};
pub use metadata::{get_charset, get_title, title_text_node};
pub use serializer::serialize_document;
