//! 兼容 OpenAI Chat Completions 接口的后端
//!
//! 请求 `POST {base_url}/chat/completions`，鉴权使用 Bearer 密钥，
//! 取 `choices[0].message.content` 作为输出。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CompletionRequest, LanguageModel};
use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};

/// 错误响应正文在错误信息中保留的最大字符数
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容客户端
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl OpenAiCompatibleClient {
    /// 创建客户端
    ///
    /// `base_url` 形如 `https://api.openai.com/v1`，末尾斜杠可有可无。
    pub fn new(base_url: &str, timeout: Duration) -> TranslationResult<Self> {
        let endpoint = Self::endpoint_for(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        Self::new(&config.api_url, config.request_timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn endpoint_for(base_url: &str) -> TranslationResult<Url> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Url::parse(&base)
            .and_then(|url| url.join("chat/completions"))
            .map_err(|e| TranslationError::ConfigError(format!("无效的 API URL '{}': {}", base_url, e)))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> TranslationResult<String> {
        let body = ChatRequest {
            model: &request.model_id,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.2,
        };

        tracing::debug!(
            "请求 {} ({:?}, {} 字节)",
            self.endpoint,
            request.purpose,
            request.prompt.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(TranslationError::http_status(status.as_u16(), preview));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        // 空应答视为没有译文
        if content.trim().is_empty() {
            tracing::warn!("模型返回了空内容");
        }
        Ok(content)
    }
}
