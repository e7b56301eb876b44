//! 翻译配置管理模块
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! 默认值 → 配置文件（TOML） → `.env` 文件 → `PAGE_TRANSLATOR_*` 环境变量

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 后端
    pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";
    pub const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    // 批次调度
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_CONCURRENCY: usize = 3;
    pub const DEFAULT_MAX_RETRY_ATTEMPTS: usize = 3;
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 800;
    pub const DEFAULT_RETRY_FACTOR: u32 = 2;

    // 应用到文档
    pub const DEFAULT_APPLY_CHUNK_SIZE: usize = 40;
    pub const DEFAULT_PROGRESS_TICK_MS: u64 = 1000;

    // 文本收集
    pub const MAX_TEXT_LENGTH: usize = 2000;

    // 新文本占比达到该值时整页重新翻译，不再使用缓存命中
    pub const LARGE_CHANGE_RATIO: f64 = 0.20;

    // 缓存
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
    pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 10_000;
    pub const CACHE_TABLE_NAME: &str = "translations";

    // 上下文分析
    pub const CONTEXT_SAMPLE_SEGMENTS: usize = 24;
    pub const CONTEXT_SAMPLE_CHARS: usize = 2500;

    // 跳过的元素（整个子树都不收集）
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "template", "iframe", "object", "embed", "video",
        "audio", "canvas", "svg", "math", "code", "pre", "kbd", "samp", "var", "textarea",
        "head",
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "page-translator.toml",
        ".page-translator.toml",
        "translation-config.toml",
    ];
}

/// 是否存在任一默认位置的配置文件
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(path).exists())
}
