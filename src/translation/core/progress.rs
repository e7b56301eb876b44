//! 进度与状态上报
//!
//! [`ProgressStatus`] 是带版本号的完整快照，每次状态变化以及批次在途时的
//! 周期性心跳都会把它推送给已连接的观察者。没有观察者或观察者已断开时，
//! 推送是静默的空操作；断开的观察者会被丢弃。

use std::cell::{Cell, RefCell};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::translation::pipeline::BatchSummary;

/// 快照格式版本
pub const PROGRESS_SCHEMA_VERSION: u32 = 1;

/// 预览文本的最大字符数
const PREVIEW_CHARS: usize = 80;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Inactive,
    Translating,
    Completed,
    Cancelled,
    Error,
    Restored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Error
        )
    }
}

/// 进度快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStatus {
    pub schema_version: u32,
    pub state: SessionState,
    pub total_texts: usize,
    /// 缓存命中与新译文之和
    pub translated_count: usize,
    pub cached_count: usize,
    pub batch_count: usize,
    pub batches_done: usize,
    pub batches: Vec<BatchSummary>,
    pub active_ms: u64,
    pub original_title: Option<String>,
    pub translated_title: Option<String>,
    pub preview_text: Option<String>,
    pub failed_batches: usize,
    pub error: Option<String>,
    pub cancel_reason: Option<String>,
}

impl Default for ProgressStatus {
    fn default() -> Self {
        Self {
            schema_version: PROGRESS_SCHEMA_VERSION,
            state: SessionState::Inactive,
            total_texts: 0,
            translated_count: 0,
            cached_count: 0,
            batch_count: 0,
            batches_done: 0,
            batches: Vec::new(),
            active_ms: 0,
            original_title: None,
            translated_title: None,
            preview_text: None,
            failed_batches: 0,
            error: None,
            cancel_reason: None,
        }
    }
}

/// 截断预览文本
pub fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(PREVIEW_CHARS).collect();
    truncated.push('…');
    truncated
}

/// 活跃时间计时器
///
/// 在途请求数从 0 变为 1 时开始计时，从 1 变为 0 时停止并累加。
#[derive(Debug, Default)]
pub struct ActiveTimer {
    in_flight: Cell<usize>,
    started: Cell<Option<Instant>>,
    accumulated: Cell<Duration>,
}

impl ActiveTimer {
    pub fn begin(&self) {
        let count = self.in_flight.get();
        if count == 0 {
            self.started.set(Some(Instant::now()));
        }
        self.in_flight.set(count + 1);
    }

    pub fn end(&self) {
        let count = self.in_flight.get();
        if count == 0 {
            return;
        }
        self.in_flight.set(count - 1);
        if count == 1 {
            if let Some(started) = self.started.take() {
                self.accumulated.set(self.accumulated.get() + started.elapsed());
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// 累计活跃时间，包含当前正在进行的区间
    pub fn active(&self) -> Duration {
        let running = self
            .started
            .get()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.accumulated.get() + running
    }

    pub fn reset(&self) {
        self.in_flight.set(0);
        self.started.set(None);
        self.accumulated.set(Duration::ZERO);
    }
}

/// 进度上报器
#[derive(Debug, Default)]
pub struct ProgressReporter {
    status: RefCell<ProgressStatus>,
    timer: ActiveTimer,
    observer: RefCell<Option<UnboundedSender<ProgressStatus>>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 连接观察者，替换之前的观察者
    pub fn attach_observer(&self, observer: UnboundedSender<ProgressStatus>) {
        *self.observer.borrow_mut() = Some(observer);
    }

    pub fn detach_observer(&self) {
        self.observer.borrow_mut().take();
    }

    pub fn has_observer(&self) -> bool {
        self.observer.borrow().is_some()
    }

    pub fn timer(&self) -> &ActiveTimer {
        &self.timer
    }

    /// 当前快照
    pub fn snapshot(&self) -> ProgressStatus {
        let mut status = self.status.borrow().clone();
        status.active_ms = self.timer.active().as_millis() as u64;
        status
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// 修改快照但不推送
    pub fn update<F: FnOnce(&mut ProgressStatus)>(&self, f: F) {
        f(&mut self.status.borrow_mut());
    }

    /// 推送当前快照
    pub fn push(&self) {
        let snapshot = self.snapshot();
        let mut observer = self.observer.borrow_mut();
        if let Some(sender) = observer.as_ref() {
            if sender.send(snapshot).is_err() {
                tracing::debug!("进度观察者已断开");
                *observer = None;
            }
        }
    }

    /// 切换状态并推送
    pub fn set_state(&self, state: SessionState) {
        self.update(|status| status.state = state);
        self.push();
    }

    /// 开始新会话：清空计数，保留观察者
    pub fn begin_session(&self) {
        self.timer.reset();
        self.update(|status| {
            *status = ProgressStatus {
                state: SessionState::Translating,
                ..ProgressStatus::default()
            }
        });
        self.push();
    }

    /// 批次在途期间按固定间隔推送快照，需由调用方在会话结束时丢弃
    pub async fn tick(&self, period: Duration) {
        let period = period.max(Duration::from_millis(10));
        loop {
            tokio::time::sleep(period).await;
            if self.timer.in_flight() > 0 {
                self.push();
            }
        }
    }
}
