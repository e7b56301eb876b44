//! 文本收集器模块
//!
//! 按文档顺序遍历 DOM，产出可翻译的文本节点。被屏蔽的容器元素会剪掉整棵子树，
//! 效果等同于逐个检查文本节点的容器及其所有祖先。

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::translation::config::{constants, TranslationConfig};

/// 文本节点的稳定标识，取自节点 `Rc` 的分配地址
///
/// 只要持有对应的 `Handle`，该标识就不会被复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(node: &Handle) -> Self {
        NodeId(Rc::as_ptr(node) as *const () as usize)
    }
}

/// 一个待翻译的文本单元
#[derive(Debug, Clone)]
pub struct TextUnit {
    /// 收集时节点的文本内容
    pub text: String,
    /// 文本节点引用
    pub node: Handle,
}

impl TextUnit {
    pub fn new(text: String, node: Handle) -> Self {
        Self { text, node }
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::of(&self.node)
    }

    /// 获取文本字符数
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// 收集器配置
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 整棵子树都跳过的元素
    pub skip_elements: Vec<String>,
    /// 去除首尾空白后允许的最大字符数
    pub max_text_length: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            skip_elements: constants::SKIP_ELEMENTS
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
            max_text_length: constants::MAX_TEXT_LENGTH,
        }
    }
}

impl From<&TranslationConfig> for CollectorConfig {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            max_text_length: config.max_text_length,
            ..Self::default()
        }
    }
}

/// 收集统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub nodes_visited: usize,
    pub blocked_subtrees: usize,
    pub rejected_empty: usize,
    pub rejected_too_long: usize,
    pub collected: usize,
}

impl CollectionStats {
    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// 被拒绝的文本节点总数
    pub fn total_rejected(&self) -> usize {
        self.rejected_empty + self.rejected_too_long
    }
}

/// 文本收集器
pub struct TextCollector {
    config: CollectorConfig,
    stats: CollectionStats,
}

impl TextCollector {
    /// 创建新的文本收集器
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            stats: CollectionStats::default(),
        }
    }

    /// 按文档顺序收集可翻译文本
    pub fn collect(&mut self, root: &Handle) -> Vec<TextUnit> {
        self.stats.reset();

        let mut units = Vec::new();
        self.walk(root, &mut units);
        self.stats.collected = units.len();

        tracing::debug!(
            "收集到 {} 个文本单元 (访问 {} 个节点, 跳过 {} 个子树)",
            units.len(),
            self.stats.nodes_visited,
            self.stats.blocked_subtrees
        );

        units
    }

    /// 先序遍历，使用显式栈，嵌套深度不受线程栈大小限制
    fn walk(&mut self, root: &Handle, units: &mut Vec<TextUnit>) {
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            self.stats.nodes_visited += 1;

            match node.data {
                NodeData::Text { ref contents } => {
                    let text = contents.borrow().to_string();
                    if self.accept(&text) {
                        units.push(TextUnit::new(text, node.clone()));
                    }
                    continue;
                }
                NodeData::Element { ref name, .. } => {
                    if self.should_skip_element(name.local.as_ref()) {
                        self.stats.blocked_subtrees += 1;
                        continue;
                    }
                }
                _ => {}
            }

            // 逆序入栈，保证按文档顺序出栈
            stack.extend(node.children.borrow().iter().rev().cloned());
        }
    }

    fn accept(&mut self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.stats.rejected_empty += 1;
            return false;
        }
        if trimmed.chars().count() > self.config.max_text_length {
            self.stats.rejected_too_long += 1;
            return false;
        }
        true
    }

    fn should_skip_element(&self, tag_name: &str) -> bool {
        self.config
            .skip_elements
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(tag_name))
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> &CollectionStats {
        &self.stats
    }
}

impl Default for TextCollector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

/// 便利函数：使用默认配置收集
pub fn collect_text_units(root: &Handle) -> Vec<TextUnit> {
    TextCollector::default().collect(root)
}
