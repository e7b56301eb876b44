// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

use std::sync::Arc;
use std::time::Duration;

use markup5ever_rcdom::RcDom;
use tokio::sync::mpsc;

use page_translator::parsers::html::{find_nodes, html_to_dom, text_content};
use page_translator::translation::backend::{CompletionRequest, MockModel};
use page_translator::translation::storage::ContentCache;
use page_translator::translation::{PageTranslator, ProgressStatus, StartOptions, TranslationConfig};

/// 测试用配置：关闭上下文分析，缩短心跳间隔
pub fn test_config() -> TranslationConfig {
    TranslationConfig {
        analyze_context: false,
        progress_tick_ms: 100,
        ..TranslationConfig::default()
    }
}

/// 测试用启动参数
pub fn options(batch_size: usize, concurrency: usize) -> StartOptions {
    StartOptions::new("test-key")
        .with_model("test-model")
        .with_batch_size(batch_size)
        .with_concurrency(concurrency)
}

/// HTML测试工具
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 创建测试用的DOM结构
    pub fn create_test_dom(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8").unwrap()
    }

    /// `count` 个段落 `p0..p{count-1}`，没有标题
    pub fn paragraphs(count: usize) -> String {
        Self::paragraphs_with_prefix("p", count)
    }

    pub fn paragraphs_with_prefix(prefix: &str, count: usize) -> String {
        let body: String = (0..count)
            .map(|i| format!("<p>{}{}</p>", prefix, i))
            .collect();
        format!("<html><head></head><body>{}</body></html>", body)
    }

    /// 带标题的简单英文页面
    pub fn create_simple_english_page() -> String {
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Test Page</title>
    <meta charset="UTF-8">
    <style>p { color: red; }</style>
</head>
<body>
    <h1>Welcome to Test</h1>
    <p>This is a test paragraph with some <strong>important</strong> text.</p>
    <div>
        <p>Another paragraph in a div.</p>
        <a href="https://example.com">Visit Example</a>
    </div>
    <script>var greeting = "Hello";</script>
    <pre>let code = 1;</pre>
    <button>Click Me</button>
</body>
</html>"#
            .to_string()
    }

    /// 所有 `<p>` 的第一个文本子节点，按文档顺序
    pub fn paragraph_texts(dom: &RcDom) -> Vec<String> {
        find_nodes(&dom.document, &["p"])
            .iter()
            .filter_map(|p| p.children.borrow().first().and_then(text_content))
            .collect()
    }

    /// `<title>` 的文本
    pub fn title_text(dom: &RcDom) -> Option<String> {
        find_nodes(&dom.document, &["html", "head", "title"])
            .first()
            .and_then(|title| title.children.borrow().first().and_then(text_content))
    }
}

/// 请求中第一行文本，用于按批次决定延迟
pub fn first_line(request: &CompletionRequest) -> String {
    request.prompt.lines().next().unwrap_or_default().to_string()
}

/// 测试环境：文档、共享的模拟后端与翻译服务
pub struct TestEnvironment {
    pub dom: RcDom,
    pub model: Arc<MockModel>,
    pub translator: PageTranslator,
}

impl TestEnvironment {
    pub fn new(html: &str, model: MockModel) -> Self {
        Self::with_cache(html, model, ContentCache::in_memory(1000, Duration::from_secs(3600)))
    }

    pub fn with_cache(html: &str, model: MockModel, cache: ContentCache) -> Self {
        Self::with_config(html, model, cache, test_config())
    }

    pub fn with_config(
        html: &str,
        model: MockModel,
        cache: ContentCache,
        config: TranslationConfig,
    ) -> Self {
        let dom = HtmlTestHelper::create_test_dom(html);
        let model = Arc::new(model);
        let translator =
            PageTranslator::new(dom.document.clone(), Box::new(model.clone()), cache, config);

        Self {
            dom,
            model,
            translator,
        }
    }

    /// 连接观察者并返回接收端
    pub fn observe(&self) -> mpsc::UnboundedReceiver<ProgressStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.translator.attach_observer(tx);
        rx
    }
}

/// 取出接收端中已有的全部快照
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressStatus>) -> Vec<ProgressStatus> {
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    snapshots
}
