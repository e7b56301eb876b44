//! 文本处理管道模块
//!
//! - `collector`: 从 DOM 中按文档顺序收集可翻译文本
//! - `context`: 翻译前的行业上下文分析
//! - `prompts`: 批次提示词构建与响应解析
//! - `batch`: 批次切分与会话看板
//! - `scheduler`: 并发受限的批次调度与重试
//! - `apply`: 按序写回文档的重排序队列与原文记录

pub mod apply;
pub mod batch;
pub mod collector;
pub mod context;
pub mod prompts;
pub mod scheduler;

pub use apply::{ApplyContext, ApplyQueue, OriginalTextRecord};
pub use batch::{Batch, BatchBoard, BatchResult, BatchStatus, BatchSummary};
pub use collector::{CollectionStats, CollectorConfig, NodeId, TextCollector, TextUnit};
pub use context::IndustryContext;
pub use scheduler::{DispatchOutcome, RetryPolicy, Scheduler, SchedulerHooks};
