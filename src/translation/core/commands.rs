//! 命令通道
//!
//! 宿主通过 `mpsc` 通道发送 [`Command`]，[`serve`] 在当前任务上处理它们，
//! 每个命令的回复经 `oneshot` 发回。启动翻译的命令在后台 future 中运行，
//! 因此后续的 `CancelTranslation`、`GetState` 等命令可以在会话进行期间处理。

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::progress::ProgressStatus;
use super::service::{PageTranslator, StartOptions};
use crate::translation::storage::CacheStatus;

/// 入站请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Request {
    StartTranslate(StartOptions),
    RestoreOriginal,
    CancelTranslation { reason: String },
    GetState,
    GetTranslatedTitle,
    GetCacheStatus,
    ClearCacheForDomain,
}

/// 请求的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Response {
    /// 会话结束时的最终快照
    Finished(ProgressStatus),
    Restored { count: usize },
    Cancelled { cancelled: bool },
    State(ProgressStatus),
    TranslatedTitle(Option<String>),
    CacheStatus(CacheStatus),
    CacheCleared,
    Error { message: String },
}

/// 请求与其回复通道
#[derive(Debug)]
pub struct Command {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

impl Command {
    pub fn new(request: Request) -> (Self, oneshot::Receiver<Response>) {
        let (reply, receiver) = oneshot::channel();
        (Self { request, reply }, receiver)
    }
}

/// 处理命令直到发送端全部关闭，然后等待仍在运行的会话结束
pub async fn serve(translator: &PageTranslator, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut sessions = FuturesUnordered::new();

    loop {
        tokio::select! {
            // 新启动的会话先被轮询一次，进入翻译状态后再处理下一条命令
            biased;

            Some(()) = sessions.next(), if !sessions.is_empty() => {}
            command = commands.recv() => {
                let Some(Command { request, reply }) = command else {
                    break;
                };

                match request {
                    Request::StartTranslate(options) => {
                        sessions.push(async move {
                            let response = match translator.start_translate(options).await {
                                Ok(status) => Response::Finished(status),
                                Err(e) => Response::Error { message: e.to_string() },
                            };
                            send_reply(reply, response);
                        });
                    }
                    request => send_reply(reply, handle(translator, request)),
                }
            }
        }
    }

    while sessions.next().await.is_some() {}
    tracing::debug!("命令通道已关闭");
}

/// 处理不需要等待的请求
fn handle(translator: &PageTranslator, request: Request) -> Response {
    match request {
        Request::StartTranslate(_) => Response::Error {
            message: "启动请求必须经由命令循环处理".to_string(),
        },
        Request::RestoreOriginal => match translator.restore_original() {
            Ok(count) => Response::Restored { count },
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::CancelTranslation { reason } => Response::Cancelled {
            cancelled: translator.cancel_translation(&reason),
        },
        Request::GetState => Response::State(translator.get_state()),
        Request::GetTranslatedTitle => Response::TranslatedTitle(translator.get_translated_title()),
        Request::GetCacheStatus => Response::CacheStatus(translator.get_cache_status()),
        Request::ClearCacheForDomain => match translator.clear_cache_for_domain() {
            Ok(()) => Response::CacheCleared,
            Err(e) => Response::Error { message: e.to_string() },
        },
    }
}

fn send_reply(reply: oneshot::Sender<Response>, response: Response) {
    if reply.send(response).is_err() {
        tracing::debug!("请求方已放弃等待回复");
    }
}
