//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。取消不是错误，不在这里出现。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 网络错误（连接失败、超时等传输层问题）
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 后端返回了非成功的 HTTP 状态码
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        retryable: bool,
        message: String,
    },

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 当前状态不允许该操作
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// 文本收集错误
    #[error("文本收集错误: {0}")]
    TextCollectionError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 由 HTTP 状态码构造错误，5xx 与 429 视为可重试
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        TranslationError::HttpStatus {
            status,
            retryable: status == 429 || (500..600).contains(&status),
            message: message.into(),
        }
    }

    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::HttpStatus { retryable, .. } => *retryable,
            TranslationError::ParseError(_) => false,
            TranslationError::CacheError(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidState(_) => false,
            TranslationError::TextCollectionError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::HttpStatus { retryable: true, .. } => ErrorSeverity::Warning,
            TranslationError::HttpStatus { .. } => ErrorSeverity::Error,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::CacheError(_) => ErrorSeverity::Warning,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidState(_) => ErrorSeverity::Info,
            TranslationError::TextCollectionError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::HttpStatus { status: 429, .. } => ErrorCategory::RateLimit,
            TranslationError::HttpStatus { .. } => ErrorCategory::Service,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::CacheError(_) => ErrorCategory::Cache,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidState(_) => ErrorCategory::State,
            TranslationError::TextCollectionError(_) => ErrorCategory::Processing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        match &mut self {
            TranslationError::HttpStatus { message, .. } => {
                *message = format!("{} (上下文: {})", message, context);
            }
            TranslationError::NetworkError(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::CacheError(msg)
            | TranslationError::ConfigError(msg)
            | TranslationError::InvalidState(msg)
            | TranslationError::TextCollectionError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InternalError(msg) => {
                *msg = format!("{} (上下文: {})", msg, context);
            }
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    RateLimit,
    Cache,
    Processing,
    Service,
    State,
    Parsing,
    Serialization,
    Internal,
}

// ============================================================================
// 标准错误转换
// ============================================================================

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::InternalError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => TranslationError::http_status(status.as_u16(), error.to_string()),
            None if error.is_decode() => {
                TranslationError::SerializationError(format!("响应解码失败: {}", error))
            }
            None => TranslationError::NetworkError(error.to_string()),
        }
    }
}

impl From<crate::env::EnvError> for TranslationError {
    fn from(error: crate::env::EnvError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建缓存错误
    pub fn cache_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::CacheError(msg.to_string())
    }

    /// 创建状态错误
    pub fn state_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InvalidState(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_retryability() {
        assert!(TranslationError::http_status(500, "boom").is_retryable());
        assert!(TranslationError::http_status(503, "unavailable").is_retryable());
        assert!(TranslationError::http_status(429, "slow down").is_retryable());
        assert!(!TranslationError::http_status(400, "bad request").is_retryable());
        assert!(!TranslationError::http_status(401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_category_and_severity() {
        let rate_limited = TranslationError::http_status(429, "");
        assert_eq!(rate_limited.category(), ErrorCategory::RateLimit);
        assert_eq!(rate_limited.severity(), ErrorSeverity::Warning);

        let network = TranslationError::NetworkError("reset".into());
        assert!(network.is_retryable());
        assert_eq!(network.category(), ErrorCategory::Network);

        assert_eq!(
            TranslationError::ConfigError("x".into()).severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_with_context() {
        let err = TranslationError::CacheError("disk full".into()).with_context("set");
        assert_eq!(err.to_string(), "缓存错误: disk full (上下文: set)");

        let err = TranslationError::http_status(502, "bad gateway").with_context("batch 3");
        assert!(err.to_string().contains("batch 3"));
        assert!(err.is_retryable());
    }
}
