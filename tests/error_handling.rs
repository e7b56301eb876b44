//! 错误处理集成测试
//!
//! 测试批次失败隔离、重试耗尽、非法状态与参数校验

use std::time::Duration;

use page_translator::translation::backend::MockModel;
use page_translator::translation::pipeline::BatchStatus;
use page_translator::translation::{ErrorCategory, SessionState, StartOptions, TranslationError};

mod common {
    include!("common/mod.rs");
}

use common::{options, HtmlTestHelper, TestEnvironment};

/// 所有批次失败时会话以错误结束，文档保持原样
#[tokio::test]
async fn test_all_batches_failed_ends_in_error() {
    let model = MockModel::new().failing(TranslationError::http_status(401, "invalid api key"));
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(4), model);

    let status = env.translator.start_translate(options(2, 2)).await.unwrap();

    assert_eq!(status.state, SessionState::Error);
    assert_eq!(status.failed_batches, 2);
    assert_eq!(status.translated_count, 0);
    let message = status.error.unwrap();
    assert!(message.contains("全部 2 个批次均失败"), "unexpected message: {}", message);
    assert!(message.contains("401"));

    // 401 不可重试，每个批次只请求一次
    assert_eq!(env.model.calls().len(), 2);
    assert_eq!(
        HtmlTestHelper::paragraph_texts(&env.dom),
        vec!["p0", "p1", "p2", "p3"]
    );
}

/// 单个批次失败不影响后续批次写入
#[tokio::test]
async fn test_failed_batch_is_isolated() {
    let model = MockModel::new().with_script(vec![Err(TranslationError::http_status(400, "bad request"))]);
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(4), model);

    let status = env.translator.start_translate(options(2, 1)).await.unwrap();

    assert_eq!(status.state, SessionState::Completed);
    assert_eq!(status.failed_batches, 1);
    assert_eq!(status.batches_done, 2);
    assert_eq!(status.batches[0].status, BatchStatus::Failed);
    assert_eq!(status.batches[1].status, BatchStatus::Completed);
    assert_eq!(status.translated_count, 2);
    assert_eq!(
        HtmlTestHelper::paragraph_texts(&env.dom),
        vec!["p0", "p1", "T:p2", "T:p3"]
    );
}

/// 可重试错误在第三次尝试后放弃，间隔按指数退避
#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_backoff() {
    let model = MockModel::new().failing(TranslationError::http_status(503, "overloaded"));
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(1), model);

    let status = env.translator.start_translate(options(50, 1)).await.unwrap();
    assert_eq!(status.state, SessionState::Error);

    let calls = env.model.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].at - calls[0].at, Duration::from_millis(800));
    assert_eq!(calls[2].at - calls[1].at, Duration::from_millis(1600));
}

/// 模型漏掉的行保持原文
#[tokio::test]
async fn test_partial_response_leaves_missing_lines() {
    let model = MockModel::new().with_script(vec![Ok("[0] uno\n[2] tres".to_string())]);
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(3), model);

    let status = env.translator.start_translate(options(50, 1)).await.unwrap();

    assert_eq!(status.state, SessionState::Completed);
    assert_eq!(status.translated_count, 2);
    assert_eq!(
        HtmlTestHelper::paragraph_texts(&env.dom),
        vec!["uno", "p1", "tres"]
    );
}

/// 空应答不算失败：批次完成，原文保持不变
#[tokio::test]
async fn test_empty_reply_keeps_original_text() {
    let model = MockModel::new().with_script(vec![Ok(String::new())]);
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(2), model);

    let status = env.translator.start_translate(options(50, 1)).await.unwrap();

    assert_eq!(status.state, SessionState::Completed);
    assert_eq!(status.failed_batches, 0);
    assert_eq!(status.batches[0].status, BatchStatus::Completed);
    assert_eq!(status.translated_count, 0);
    assert!(status.error.is_none());
    assert_eq!(HtmlTestHelper::paragraph_texts(&env.dom), vec!["p0", "p1"]);
    assert_eq!(env.translator.get_cache_status().count, 0);
}

/// 翻译进行中再次启动返回状态错误
#[tokio::test(start_paused = true)]
async fn test_start_while_translating_is_rejected() {
    let model = MockModel::new().with_delay(|_| Duration::from_millis(500));
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(2), model);

    let (first, second) = tokio::join!(env.translator.start_translate(options(50, 1)), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        env.translator.start_translate(options(50, 1)).await
    });

    assert_eq!(first.unwrap().state, SessionState::Completed);
    let error = second.unwrap_err();
    assert!(matches!(error, TranslationError::InvalidState(_)));
    assert_eq!(error.category(), ErrorCategory::State);
}

/// 没有翻译过时还原返回状态错误
#[tokio::test]
async fn test_restore_without_translation_is_rejected() {
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(2), MockModel::new());

    assert!(matches!(
        env.translator.restore_original(),
        Err(TranslationError::InvalidState(_))
    ));
    assert!(!env.translator.cancel_translation("nothing running"));
    assert_eq!(env.translator.get_state().state, SessionState::Inactive);
}

/// 参数校验在会话开始前完成
#[tokio::test]
async fn test_invalid_start_options() {
    let env = TestEnvironment::new(&HtmlTestHelper::paragraphs(2), MockModel::new());

    for options in [
        StartOptions::new(""),
        StartOptions::new("key").with_batch_size(0),
        StartOptions::new("key").with_concurrency(0),
    ] {
        let error = env.translator.start_translate(options).await.unwrap_err();
        assert!(matches!(error, TranslationError::ConfigError(_)));
        assert!(!error.is_retryable());
    }

    assert!(env.model.calls().is_empty());
    assert_eq!(env.translator.get_state().state, SessionState::Inactive);
}

/// 空文档直接完成
#[tokio::test]
async fn test_empty_document_completes() {
    for html in ["", "<script>alert('x')</script>", "<!DOCTYPE html>", "<div>   </div>"] {
        let env = TestEnvironment::new(html, MockModel::new());
        let status = env.translator.start_translate(options(50, 3)).await.unwrap();

        assert_eq!(status.state, SessionState::Completed, "html: {:?}", html);
        assert_eq!(status.total_texts, 0);
        assert!(env.model.calls().is_empty());
    }
}
