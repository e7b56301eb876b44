//! 有序应用队列
//!
//! 批次可能以任意顺序返回，但译文必须严格按 `sequence_index` 写回文档：
//! 队列维护 `next_index`，从这里开始依次处理：
//! - 已应用：前进
//! - 未返回：停止，等下一次 flush
//! - 失败：标记为已应用，前进
//! - 就绪：写入每个非空译文，标记为已应用，前进
//!
//! 同一时刻只有一个 flush 在执行；其间到来的 flush 请求只设置重跑标志。
//! 写入按块进行，块之间主动让出执行权，每块开始前检查取消。
//! 缓存只在译文成功写入文档之后才更新。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use markup5ever_rcdom::Handle;
use tokio_util::sync::CancellationToken;

use super::batch::{BatchBoard, BatchResult};
use super::collector::{NodeId, TextUnit};
use crate::parsers::html::{set_text_content, text_content};
use crate::translation::storage::ContentCache;

// ============================================================================
// 原文记录
// ============================================================================

/// 节点原文记录
///
/// 每个节点在第一次被改写前记录一次原文，之后的写入不会覆盖它。
/// 还原时写回全部原文并清空记录。
#[derive(Debug, Default)]
pub struct OriginalTextRecord {
    entries: RefCell<HashMap<NodeId, (Handle, String)>>,
}

impl OriginalTextRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录节点当前文本，已有记录时保持不变
    pub fn capture(&self, node: &Handle) {
        let id = NodeId::of(node);
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&id) {
            return;
        }
        if let Some(text) = text_content(node) {
            entries.insert(id, (node.clone(), text));
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    pub fn original(&self, id: NodeId) -> Option<String> {
        self.entries.borrow().get(&id).map(|(_, text)| text.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// 写回全部原文并清空记录，返回还原的节点数
    pub fn restore_all(&self) -> usize {
        let entries: Vec<(Handle, String)> = self.entries.borrow_mut().drain().map(|(_, v)| v).collect();
        for (node, text) in &entries {
            set_text_content(node, text);
        }
        entries.len()
    }
}

/// 改写节点文本，保留原节点首尾的空白
pub fn write_translation(record: &OriginalTextRecord, node: &Handle, source: &str, translation: &str) {
    record.capture(node);

    let leading = &source[..source.len() - source.trim_start().len()];
    let trailing = &source[source.trim_end().len()..];
    let body = translation.trim();
    let body = if body.is_empty() { source.trim() } else { body };

    set_text_content(node, &format!("{}{}{}", leading, body, trailing));
}

// ============================================================================
// 分块写入
// ============================================================================

/// 一个写入块完成后的通知
#[derive(Debug, Clone, Copy)]
pub struct AppliedChunk<'a> {
    pub count: usize,
    pub last_translation: Option<&'a str>,
}

/// 写入所需的会话上下文
pub struct ApplyContext<'a> {
    pub record: &'a OriginalTextRecord,
    pub cache: &'a ContentCache,
    pub model_id: &'a str,
    pub chunk_size: usize,
    pub cancel: &'a CancellationToken,
    pub on_applied: &'a dyn Fn(AppliedChunk<'_>),
}

/// 分块写入译文
///
/// 返回 `false` 表示因取消而提前停止。`write_cache` 为真时，
/// 每块写入文档后以一次提交写入缓存。
pub async fn apply_in_chunks(
    pairs: &[(TextUnit, String)],
    ctx: &ApplyContext<'_>,
    write_cache: bool,
) -> bool {
    for (n, chunk) in pairs.chunks(ctx.chunk_size.max(1)).enumerate() {
        if n > 0 {
            tokio::task::yield_now().await;
        }
        if ctx.cancel.is_cancelled() {
            return false;
        }

        for (unit, translation) in chunk {
            write_translation(ctx.record, &unit.node, &unit.text, translation);
        }

        if write_cache {
            let entries: Vec<(&str, &str)> = chunk
                .iter()
                .map(|(unit, translation)| (unit.text.as_str(), translation.as_str()))
                .collect();
            ctx.cache.set_many(&entries, ctx.model_id);
        }

        (ctx.on_applied)(AppliedChunk {
            count: chunk.len(),
            last_translation: chunk.last().map(|(_, translation)| translation.as_str()),
        });
    }

    true
}

// ============================================================================
// 重排序队列
// ============================================================================

/// 下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    /// 已应用，直接前进
    Advance(usize),
    /// 失败批次，标记后前进
    Skip(usize),
    /// 就绪批次，写入后前进
    Apply(usize),
}

/// 有序应用队列
#[derive(Debug, Default)]
pub struct ApplyQueue {
    next_index: Cell<usize>,
    flushing: Cell<bool>,
    rerun: Cell<bool>,
}

impl ApplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&self) -> usize {
        self.next_index.get()
    }

    /// 计算 `next_index` 处的动作，`None` 表示需要等待或已全部处理
    pub fn next_step(&self, board: &BatchBoard) -> Option<ApplyStep> {
        let index = self.next_index.get();
        if index >= board.len() {
            return None;
        }
        if board.is_applied(index) {
            return Some(ApplyStep::Advance(index));
        }

        match board.result(index) {
            BatchResult::NotReturned => None,
            BatchResult::Failed => Some(ApplyStep::Skip(index)),
            BatchResult::Ready(_) => Some(ApplyStep::Apply(index)),
        }
    }

    /// 尽可能多地按序写入已返回的批次
    pub async fn flush(&self, board: &BatchBoard, ctx: &ApplyContext<'_>) {
        if self.flushing.get() {
            self.rerun.set(true);
            return;
        }

        self.flushing.set(true);
        loop {
            self.rerun.set(false);
            self.drain(board, ctx).await;
            if !self.rerun.get() || ctx.cancel.is_cancelled() {
                break;
            }
        }
        self.flushing.set(false);
    }

    async fn drain(&self, board: &BatchBoard, ctx: &ApplyContext<'_>) {
        while let Some(step) = self.next_step(board) {
            match step {
                ApplyStep::Advance(_) => {}
                ApplyStep::Skip(index) => {
                    tracing::debug!("跳过失败批次 {}", index);
                    board.mark_applied(index);
                }
                ApplyStep::Apply(index) => {
                    if ctx.cancel.is_cancelled() {
                        return;
                    }

                    let BatchResult::Ready(translations) = board.result(index) else {
                        return;
                    };
                    let pairs: Vec<(TextUnit, String)> = board
                        .units(index)
                        .into_iter()
                        .zip(translations)
                        .filter_map(|(unit, translation)| translation.map(|t| (unit, t)))
                        .collect();

                    if !apply_in_chunks(&pairs, ctx, true).await {
                        return;
                    }

                    tracing::debug!("批次 {} 已写入 {} 条译文", index, pairs.len());
                    board.mark_applied(index);
                }
            }
            self.next_index.set(self.next_index.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::parsers::html::html_to_dom;
    use crate::translation::error::TranslationResult;
    use crate::translation::pipeline::collector::collect_text_units;
    use crate::translation::storage::{CacheRecord, CacheStatus, CacheStore, MemoryStore};

    fn no_op(_: AppliedChunk<'_>) {}

    fn node_text(unit: &TextUnit) -> String {
        text_content(&unit.node).unwrap()
    }

    #[test]
    fn test_write_preserves_surrounding_whitespace() {
        let dom = html_to_dom(b"<p>  Hello world \n</p>", "utf-8").unwrap();
        let unit = collect_text_units(&dom.document).remove(0);
        let record = OriginalTextRecord::new();

        write_translation(&record, &unit.node, &unit.text, " Bonjour le monde ");
        assert_eq!(node_text(&unit), "  Bonjour le monde \n");
    }

    #[test]
    fn test_record_is_first_write_wins() {
        let dom = html_to_dom(b"<p>Original</p>", "utf-8").unwrap();
        let unit = collect_text_units(&dom.document).remove(0);
        let record = OriginalTextRecord::new();

        write_translation(&record, &unit.node, &unit.text, "First");
        write_translation(&record, &unit.node, "First", "Second");

        assert_eq!(record.len(), 1);
        assert_eq!(record.original(unit.node_id()).as_deref(), Some("Original"));
        assert_eq!(node_text(&unit), "Second");

        assert_eq!(record.restore_all(), 1);
        assert_eq!(node_text(&unit), "Original");
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_flush_waits_for_gaps_and_skips_failures() {
        let dom = html_to_dom(b"<p>a</p><p>b</p><p>c</p>", "utf-8").unwrap();
        let units = collect_text_units(&dom.document);
        let board = BatchBoard::from_units(units.clone(), 1);
        let record = OriginalTextRecord::new();
        let cache = ContentCache::in_memory(16, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 40,
            cancel: &cancel,
            on_applied: &no_op,
        };
        let queue = ApplyQueue::new();

        board.settle(2, BatchResult::Ready(vec![Some("C".into())]));
        queue.flush(&board, &ctx).await;
        assert_eq!(queue.next_index(), 0);
        assert_eq!(node_text(&units[2]), "c");

        board.settle(1, BatchResult::Failed);
        queue.flush(&board, &ctx).await;
        assert_eq!(queue.next_index(), 0);

        board.settle(0, BatchResult::Ready(vec![Some("A".into())]));
        queue.flush(&board, &ctx).await;
        assert_eq!(queue.next_index(), 3);
        assert_eq!(node_text(&units[0]), "A");
        assert_eq!(node_text(&units[1]), "b");
        assert_eq!(node_text(&units[2]), "C");

        assert_eq!(cache.get("a").as_deref(), Some("A"));
        assert!(cache.get("b").is_none());
    }

    #[tokio::test]
    async fn test_missing_translations_leave_node_untouched() {
        let dom = html_to_dom(b"<p>x</p><p>y</p>", "utf-8").unwrap();
        let units = collect_text_units(&dom.document);
        let board = BatchBoard::from_units(units.clone(), 2);
        let record = OriginalTextRecord::new();
        let cache = ContentCache::disabled();
        let cancel = CancellationToken::new();
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 1,
            cancel: &cancel,
            on_applied: &no_op,
        };

        board.settle(0, BatchResult::Ready(vec![None, Some("Y".into())]));
        ApplyQueue::new().flush(&board, &ctx).await;

        assert_eq!(node_text(&units[0]), "x");
        assert_eq!(node_text(&units[1]), "Y");
        assert_eq!(record.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_flush_mutates_nothing() {
        let dom = html_to_dom(b"<p>x</p>", "utf-8").unwrap();
        let units = collect_text_units(&dom.document);
        let board = BatchBoard::from_units(units.clone(), 1);
        let record = OriginalTextRecord::new();
        let cache = ContentCache::in_memory(4, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 40,
            cancel: &cancel,
            on_applied: &no_op,
        };

        board.settle(0, BatchResult::Ready(vec![Some("X".into())]));
        cancel.cancel();
        ApplyQueue::new().flush(&board, &ctx).await;

        assert_eq!(node_text(&units[0]), "x");
        assert!(record.is_empty());
        assert!(cache.get("x").is_none());
    }

    #[tokio::test]
    async fn test_flush_during_flush_sets_rerun() {
        let dom = html_to_dom(b"<p>a0</p><p>a1</p><p>b0</p><p>b1</p>", "utf-8").unwrap();
        let units = collect_text_units(&dom.document);
        let board = BatchBoard::from_units(units.clone(), 2);
        let record = OriginalTextRecord::new();
        let cache = ContentCache::disabled();
        let cancel = CancellationToken::new();
        let applied = RefCell::new(Vec::new());
        let on_applied = |chunk: AppliedChunk<'_>| {
            applied
                .borrow_mut()
                .extend(chunk.last_translation.map(str::to_string));
        };
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 1,
            cancel: &cancel,
            on_applied: &on_applied,
        };
        let queue = ApplyQueue::new();

        board.settle(0, BatchResult::Ready(vec![Some("A0".into()), Some("A1".into())]));

        let late_settle = async {
            // 第一个 flush 写完首块后让出，此时批次 1 返回
            assert_eq!(node_text(&units[0]), "A0");
            assert_eq!(node_text(&units[1]), "a1");

            board.settle(1, BatchResult::Ready(vec![Some("B0".into()), Some("B1".into())]));
            queue.flush(&board, &ctx).await;

            // 立即返回，没有写入任何内容
            assert_eq!(node_text(&units[1]), "a1");
            assert_eq!(node_text(&units[2]), "b0");
            assert_eq!(queue.next_index(), 0);
        };

        tokio::join!(queue.flush(&board, &ctx), late_settle);

        assert_eq!(queue.next_index(), 2);
        assert_eq!(*applied.borrow(), vec!["A0", "A1", "B0", "B1"]);
        assert_eq!(
            units.iter().map(node_text).collect::<Vec<_>>(),
            vec!["A0", "A1", "B0", "B1"]
        );
        assert!(board.is_applied(0) && board.is_applied(1));
    }

    /// 统计写事务次数的存储
    struct CountingStore {
        inner: MemoryStore,
        commits: Arc<AtomicUsize>,
    }

    impl CacheStore for CountingStore {
        fn get(&self, key: &str) -> TranslationResult<Option<CacheRecord>> {
            self.inner.get(key)
        }

        fn put(&self, record: CacheRecord) -> TranslationResult<()> {
            self.put_many(vec![record])
        }

        fn put_many(&self, records: Vec<CacheRecord>) -> TranslationResult<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.put_many(records)
        }

        fn clear(&self) -> TranslationResult<()> {
            self.inner.clear()
        }

        fn status(&self) -> TranslationResult<CacheStatus> {
            self.inner.status()
        }
    }

    #[tokio::test]
    async fn test_cache_written_once_per_chunk() {
        let html: String = (0..5).map(|i| format!("<p>w{}</p>", i)).collect();
        let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
        let units = collect_text_units(&dom.document);
        let board = BatchBoard::from_units(units, 5);
        let commits = Arc::new(AtomicUsize::new(0));
        let cache = ContentCache::new(
            Box::new(CountingStore {
                inner: MemoryStore::new(16),
                commits: commits.clone(),
            }),
            Duration::from_secs(60),
        );
        let record = OriginalTextRecord::new();
        let cancel = CancellationToken::new();
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 2,
            cancel: &cancel,
            on_applied: &no_op,
        };

        board.settle(
            0,
            BatchResult::Ready((0..5).map(|i| Some(format!("W{}", i))).collect()),
        );
        ApplyQueue::new().flush(&board, &ctx).await;

        assert_eq!(commits.load(Ordering::SeqCst), 3);
        assert_eq!(cache.status().count, 5);
        assert_eq!(cache.get("w4").as_deref(), Some("W4"));
    }

    #[tokio::test]
    async fn test_chunks_report_progress() {
        let html: String = (0..5).map(|i| format!("<p>t{}</p>", i)).collect();
        let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
        let pairs: Vec<(TextUnit, String)> = collect_text_units(&dom.document)
            .into_iter()
            .map(|unit| {
                let t = unit.text.to_uppercase();
                (unit, t)
            })
            .collect();

        let record = OriginalTextRecord::new();
        let cache = ContentCache::disabled();
        let cancel = CancellationToken::new();
        let chunks = RefCell::new(Vec::new());
        let on_applied = |chunk: AppliedChunk<'_>| {
            chunks
                .borrow_mut()
                .push((chunk.count, chunk.last_translation.map(str::to_string)));
        };
        let ctx = ApplyContext {
            record: &record,
            cache: &cache,
            model_id: "m",
            chunk_size: 2,
            cancel: &cancel,
            on_applied: &on_applied,
        };

        assert!(apply_in_chunks(&pairs, &ctx, false).await);
        assert_eq!(
            chunks.into_inner(),
            vec![
                (2, Some("T1".to_string())),
                (2, Some("T3".to_string())),
                (1, Some("T4".to_string()))
            ]
        );
        assert_eq!(record.len(), 5);
    }
}
