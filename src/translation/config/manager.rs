//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::env::EnvVar;
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 后端
    pub api_url: String,
    pub target_language: String,
    pub model_id: String,
    pub request_timeout_secs: u64,

    // 批次调度
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_factor: u32,

    // 缓存
    pub cache_enabled: bool,
    pub cache_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub memory_cache_size: usize,

    // 文档应用与进度
    pub apply_chunk_size: usize,
    pub progress_tick_ms: u64,

    // 功能开关
    pub analyze_context: bool,
    pub max_text_length: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            model_id: constants::DEFAULT_MODEL_ID.to_string(),
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),

            batch_size: constants::DEFAULT_BATCH_SIZE,
            concurrency: constants::DEFAULT_CONCURRENCY,
            max_retry_attempts: constants::DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
            retry_factor: constants::DEFAULT_RETRY_FACTOR,

            cache_enabled: true,
            cache_path: None,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
            memory_cache_size: constants::DEFAULT_MEMORY_CACHE_SIZE,

            apply_chunk_size: constants::DEFAULT_APPLY_CHUNK_SIZE,
            progress_tick_ms: constants::DEFAULT_PROGRESS_TICK_MS,

            analyze_context: true,
            max_text_length: constants::MAX_TEXT_LENGTH,
        }
    }
}

impl TranslationConfig {
    /// 从 TOML 文本解析配置，缺失字段取默认值
    pub fn from_toml_str(content: &str) -> TranslationResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.batch_size == 0 {
            return Err(TranslationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.concurrency == 0 {
            return Err(TranslationError::ConfigError("并发数不能为0".to_string()));
        }

        if self.max_retry_attempts == 0 {
            return Err(TranslationError::ConfigError("最大尝试次数不能为0".to_string()));
        }

        if self.apply_chunk_size == 0 {
            return Err(TranslationError::ConfigError("应用分块大小不能为0".to_string()));
        }

        if self.cache_enabled && self.cache_path.is_none() && self.memory_cache_size == 0 {
            return Err(TranslationError::ConfigError(
                "启用内存缓存时缓存大小不能为0".to_string(),
            ));
        }

        if url::Url::parse(&self.api_url).is_err() {
            return Err(TranslationError::ConfigError(format!(
                "无效的 API URL: {}",
                self.api_url
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    ///
    /// 只有显式设置的变量才会覆盖，无法解析的值记录警告后忽略。
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{backend, cache, pipeline};

        if let Some(api_url) = env_override::<_, backend::ApiUrl>() {
            tracing::info!("环境变量覆盖 API URL: {}", api_url);
            self.api_url = api_url;
        }
        if let Some(model_id) = env_override::<_, backend::Model>() {
            self.model_id = model_id;
        }
        if let Some(target_language) = env_override::<_, backend::TargetLanguage>() {
            self.target_language = target_language;
        }
        if let Some(timeout) = env_override::<_, backend::RequestTimeout>() {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Some(batch_size) = env_override::<_, pipeline::BatchSize>() {
            self.batch_size = batch_size;
        }
        if let Some(concurrency) = env_override::<_, pipeline::Concurrency>() {
            self.concurrency = concurrency;
        }
        if let Some(attempts) = env_override::<_, pipeline::MaxRetryAttempts>() {
            self.max_retry_attempts = attempts;
        }
        if let Some(analyze) = env_override::<_, pipeline::AnalyzeContext>() {
            self.analyze_context = analyze;
        }

        if let Some(enabled) = env_override::<_, cache::Enabled>() {
            self.cache_enabled = enabled;
        }
        if let Some(path) = env_override::<_, cache::Path>() {
            self.cache_path = Some(path);
        }
        if let Some(ttl) = env_override::<_, cache::Ttl>() {
            self.cache_ttl_secs = ttl.as_secs();
        }
        if let Some(size) = env_override::<_, cache::MemorySize>() {
            self.memory_cache_size = size;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }
}

fn env_override<T, V: EnvVar<T>>() -> Option<T> {
    std::env::var(V::NAME).ok()?;
    match V::get() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("忽略环境变量: {}", e);
            None
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 按默认搜索路径创建配置管理器
    pub fn new() -> TranslationResult<Self> {
        Self::load(None)
    }

    /// 加载配置；给定路径时只读取该文件，否则搜索 `CONFIG_PATHS`
    pub fn load(explicit_path: Option<&Path>) -> TranslationResult<Self> {
        Self::load_dotenv();

        let source = match explicit_path {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                return Err(TranslationError::ConfigError(format!(
                    "配置文件不存在: {}",
                    path.display()
                )))
            }
            None => constants::CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists()),
        };

        let mut config = match &source {
            Some(path) => {
                tracing::info!("加载配置文件: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                tracing::debug!("未找到配置文件，使用默认配置");
                TranslationConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config, source })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 实际加载的配置文件
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        Ok(settings.try_deserialize::<TranslationConfig>()?)
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::debug!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}
