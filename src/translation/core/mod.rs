//! 翻译系统核心模块
//!
//! 把管道各阶段组织成会话，并向宿主提供命令与进度接口。
//!
//! ## 模块组织
//!
//! - **服务层** (`service.rs`): `PageTranslator`，跨会话存活的状态与全部入站操作
//! - **命令通道** (`commands.rs`): 以 `mpsc`/`oneshot` 驱动服务
//! - **会话** (`session.rs`): 一次翻译的完整流程
//! - **标题** (`title.rs`): 与正文并发的标题翻译
//! - **进度** (`progress.rs`): 状态机、活跃计时与快照推送
//!
//! ## 模块依赖关系
//!
//! ```text
//! PageTranslator (service.rs)
//!     └── Session (session.rs)
//!             ├── TextCollector (pipeline/collector.rs)
//!             ├── ContentCache (storage/cache.rs)
//!             ├── Scheduler (pipeline/scheduler.rs)
//!             ├── ApplyQueue (pipeline/apply.rs)
//!             ├── translate_title (title.rs)
//!             └── ProgressReporter (progress.rs)
//! ```

pub mod commands;
pub mod progress;
pub mod service;
pub mod session;
pub mod title;

pub use commands::{serve, Command, Request, Response};
pub use progress::{ProgressReporter, ProgressStatus, SessionState, PROGRESS_SCHEMA_VERSION};
pub use service::{PageTranslator, StartOptions};
pub use session::{Session, SessionSettings};
