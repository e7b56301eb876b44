//! HTML 文档元数据处理模块
//!
//! 翻译会话需要两类元数据：
//! - 字符编码声明，用于正确解码输入文件
//! - 文档标题，由标题翻译器单独翻译

use markup5ever_rcdom::{Handle, NodeData};

use super::dom::{find_nodes, get_node_attr, text_content};

/// 获取文档声明的字符集
///
/// 支持 `<meta charset="...">` 与
/// `<meta http-equiv="content-type" content="text/html; charset=...">` 两种写法。
pub fn get_charset(node: &Handle) -> Option<String> {
    for meta_node in find_nodes(node, &["html", "head", "meta"]).iter() {
        if let Some(meta_charset_node_attr_value) = get_node_attr(meta_node, "charset") {
            return Some(meta_charset_node_attr_value);
        }

        if get_node_attr(meta_node, "http-equiv")
            .unwrap_or_default()
            .eq_ignore_ascii_case("content-type")
        {
            if let Some(content) = get_node_attr(meta_node, "content") {
                let charset = content.split(';').skip(1).find_map(|param| {
                    let (key, value) = param.split_once('=')?;
                    key.trim()
                        .eq_ignore_ascii_case("charset")
                        .then(|| value.trim().trim_matches('"').to_string())
                });
                if charset.is_some() {
                    return charset;
                }
            }
        }
    }

    None
}

/// 获取 `<title>` 下的第一个文本节点
///
/// 标题翻译器直接改写这个节点，因此还原逻辑与正文节点完全一致。
pub fn title_text_node(node: &Handle) -> Option<Handle> {
    for title_node in find_nodes(node, &["html", "head", "title"]).iter() {
        for child_node in title_node.children.borrow().iter() {
            if let NodeData::Text { .. } = child_node.data {
                return Some(child_node.clone());
            }
        }
    }

    None
}

/// 获取文档标题
pub fn get_title(node: &Handle) -> Option<String> {
    title_text_node(node).and_then(|text_node| text_content(&text_node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::html_to_dom;

    #[test]
    fn test_get_title() {
        let dom = html_to_dom(
            b"<html><head><title>Quarterly report</title></head><body></body></html>",
            "utf-8",
        )
        .unwrap();

        assert_eq!(get_title(&dom.document).as_deref(), Some("Quarterly report"));
    }

    #[test]
    fn test_missing_title() {
        let dom = html_to_dom(b"<p>no head here</p>", "utf-8").unwrap();
        assert!(get_title(&dom.document).is_none());
        assert!(title_text_node(&dom.document).is_none());
    }

    #[test]
    fn test_get_charset_variants() {
        let dom = html_to_dom(
            b"<html><head><meta charset=\"gbk\"></head></html>",
            "utf-8",
        )
        .unwrap();
        assert_eq!(get_charset(&dom.document).as_deref(), Some("gbk"));

        let dom = html_to_dom(
            b"<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=Shift_JIS\"></head></html>",
            "utf-8",
        )
        .unwrap();
        assert_eq!(get_charset(&dom.document).as_deref(), Some("Shift_JIS"));
    }
}
