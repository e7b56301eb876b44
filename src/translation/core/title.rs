//! 标题翻译
//!
//! `<title>` 按单元素批次处理：先查缓存，未命中再请求后端。
//! 失败时标题保持不变；成功时改写标题文本节点（原文同样被记录，
//! 还原时一并恢复），写入缓存并更新快照中的 `translatedTitle`。

use super::session::Session;
use crate::parsers::html::{text_content, title_text_node};
use crate::translation::backend::{CompletionRequest, RequestPurpose};
use crate::translation::pipeline::apply::write_translation;
use crate::translation::pipeline::prompts::{
    build_batch_prompt, parse_batch_response, translation_system_prompt,
};
use crate::translation::pipeline::scheduler::{dispatch_with_retry, DispatchOutcome};
use crate::translation::pipeline::NodeId;

/// 翻译文档标题
pub async fn translate_title(session: &Session<'_>) {
    let Some(node) = title_text_node(session.root) else {
        return;
    };
    let Some(text) = text_content(&node) else {
        return;
    };

    // 之前未还原的会话已经翻译过标题
    if let Some(original) = session.record.original(NodeId::of(&node)) {
        session.reporter.update(|status| {
            status.original_title = Some(original.trim().to_string());
            status.translated_title = Some(text.trim().to_string());
        });
        return;
    }

    if text.trim().is_empty() {
        return;
    }
    session
        .reporter
        .update(|status| status.original_title = Some(text.trim().to_string()));

    let cached = if session.settings.use_cache {
        session.cache.get(&text)
    } else {
        None
    };
    let from_cache = cached.is_some();

    let translation = match cached {
        Some(translation) => Some(translation),
        None => request_translation(session, &text).await,
    };
    let Some(translation) = translation else {
        return;
    };

    if session.cancel.is_cancelled() {
        return;
    }

    write_translation(session.record, &node, &text, &translation);
    if !from_cache {
        session
            .cache
            .set(&text, &translation, &session.settings.model_id);
    }

    tracing::debug!("标题已翻译: {}", translation.trim());
    session
        .reporter
        .update(|status| status.translated_title = Some(translation.trim().to_string()));
    session.reporter.push();
}

async fn request_translation(session: &Session<'_>, text: &str) -> Option<String> {
    let request = CompletionRequest {
        api_key: session.settings.api_key.clone(),
        model_id: session.settings.model_id.clone(),
        system: translation_system_prompt(&session.settings.target_language, None),
        prompt: build_batch_prompt(&[text]),
        purpose: RequestPurpose::Title,
    };

    let timer = session.reporter.timer();
    timer.begin();
    let outcome = dispatch_with_retry(
        session.model,
        &request,
        &session.settings.retry,
        &session.cancel,
    )
    .await;
    timer.end();

    match outcome {
        DispatchOutcome::Success(response) => parse_batch_response(&response, 1).pop().flatten(),
        DispatchOutcome::Failed(e) => {
            tracing::warn!("标题翻译失败，保持原标题: {}", e);
            None
        }
        DispatchOutcome::Cancelled => None,
    }
}
