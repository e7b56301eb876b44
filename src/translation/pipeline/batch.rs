//! 翻译批次模块
//!
//! 未命中缓存的文本单元按收集顺序切分为固定大小的批次，
//! `sequence_index` 在创建时确定且不再改变。[`BatchBoard`] 是一次会话内
//! 所有批次的共享看板：工作者从这里领取批次、写回结果，应用队列从这里按序读取。
//!
//! 看板只在单个任务内使用，内部以 `RefCell` 保存状态，借用从不跨越 `await`。

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

use super::collector::TextUnit;

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// 批次结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BatchResult {
    /// 尚未返回
    #[default]
    NotReturned,
    /// 重试耗尽或被取消
    Failed,
    /// 与批次单元一一对应，缺失位置为 `None`
    Ready(Vec<Option<String>>),
}

/// 翻译批次
#[derive(Debug, Clone)]
pub struct Batch {
    pub sequence_index: usize,
    pub units: Vec<TextUnit>,
    pub status: BatchStatus,
    pub translations: BatchResult,
    pub applied: bool,
}

impl Batch {
    pub fn new(sequence_index: usize, units: Vec<TextUnit>) -> Self {
        Self {
            sequence_index,
            units,
            status: BatchStatus::Pending,
            translations: BatchResult::NotReturned,
            applied: false,
        }
    }

    pub fn size(&self) -> usize {
        self.units.len()
    }

    /// 获取批次摘要
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            index: self.sequence_index,
            size: self.size(),
            status: self.status,
        }
    }
}

/// 进度快照中的批次摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub index: usize,
    pub size: usize,
    pub status: BatchStatus,
}

/// 按收集顺序切分批次
pub fn partition(units: Vec<TextUnit>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(units.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size.min(units.len()));

    for unit in units {
        current.push(unit);
        if current.len() == batch_size {
            let index = batches.len();
            batches.push(Batch::new(index, std::mem::take(&mut current)));
        }
    }

    if !current.is_empty() {
        let index = batches.len();
        batches.push(Batch::new(index, current));
    }

    batches
}

/// 会话内的批次看板
#[derive(Debug, Default)]
pub struct BatchBoard {
    batches: RefCell<Vec<Batch>>,
    next_claim: Cell<usize>,
}

impl BatchBoard {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches: RefCell::new(batches),
            next_claim: Cell::new(0),
        }
    }

    pub fn from_units(units: Vec<TextUnit>, batch_size: usize) -> Self {
        Self::new(partition(units, batch_size))
    }

    pub fn len(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 领取下一个未领取的批次，并标记为处理中
    pub fn claim(&self) -> Option<usize> {
        let index = self.next_claim.get();
        let mut batches = self.batches.borrow_mut();
        let batch = batches.get_mut(index)?;
        batch.status = BatchStatus::Processing;
        self.next_claim.set(index + 1);
        Some(index)
    }

    /// 批次中各单元的原文
    pub fn texts(&self, index: usize) -> Vec<String> {
        self.batches
            .borrow()
            .get(index)
            .map(|batch| batch.units.iter().map(|unit| unit.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn units(&self, index: usize) -> Vec<TextUnit> {
        self.batches
            .borrow()
            .get(index)
            .map(|batch| batch.units.clone())
            .unwrap_or_default()
    }

    /// 写回批次结果
    pub fn settle(&self, index: usize, result: BatchResult) {
        if let Some(batch) = self.batches.borrow_mut().get_mut(index) {
            batch.status = match result {
                BatchResult::Ready(_) => BatchStatus::Completed,
                BatchResult::Failed | BatchResult::NotReturned => BatchStatus::Failed,
            };
            batch.translations = match result {
                BatchResult::NotReturned => BatchResult::Failed,
                other => other,
            };
        }
    }

    pub fn result(&self, index: usize) -> BatchResult {
        self.batches
            .borrow()
            .get(index)
            .map(|batch| batch.translations.clone())
            .unwrap_or(BatchResult::NotReturned)
    }

    pub fn status(&self, index: usize) -> Option<BatchStatus> {
        self.batches.borrow().get(index).map(|batch| batch.status)
    }

    pub fn is_applied(&self, index: usize) -> bool {
        self.batches
            .borrow()
            .get(index)
            .map(|batch| batch.applied)
            .unwrap_or(false)
    }

    pub fn mark_applied(&self, index: usize) {
        if let Some(batch) = self.batches.borrow_mut().get_mut(index) {
            batch.applied = true;
        }
    }

    /// 已结束（完成或失败）的批次数
    pub fn done_count(&self) -> usize {
        self.batches
            .borrow()
            .iter()
            .filter(|batch| matches!(batch.status, BatchStatus::Completed | BatchStatus::Failed))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.batches
            .borrow()
            .iter()
            .filter(|batch| batch.status == BatchStatus::Failed)
            .count()
    }

    pub fn summaries(&self) -> Vec<BatchSummary> {
        self.batches.borrow().iter().map(Batch::summary).collect()
    }
}
