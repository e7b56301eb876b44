//! 行业上下文分析
//!
//! 翻译前抽样少量正文，请模型判断页面所属行业、关键词和语气，
//! 结果作为术语提示附加到批次系统指令中。任何失败都只会得到 `None`。

use serde::{Deserialize, Serialize};

use super::collector::TextUnit;
use crate::translation::backend::{CompletionRequest, LanguageModel, RequestPurpose};
use crate::translation::config::constants;
use crate::translation::storage::normalize;

/// 页面的行业上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndustryContext {
    pub industry: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub rationale: String,
}

const SYSTEM_PROMPT: &str = "You classify web pages. Read the text samples and answer with a single JSON object \
{\"industry\": string, \"keywords\": [string], \"tone\": string, \"rationale\": string}. \
No prose outside the JSON.";

/// 抽取样本：最多 24 段，总长不超过 2500 字符
pub fn sample_segments(units: &[TextUnit]) -> Vec<String> {
    let mut samples = Vec::new();
    let mut total_chars = 0;

    for unit in units {
        if samples.len() >= constants::CONTEXT_SAMPLE_SEGMENTS {
            break;
        }

        let text = normalize(&unit.text);
        let chars = text.chars().count();
        if total_chars + chars > constants::CONTEXT_SAMPLE_CHARS {
            break;
        }

        total_chars += chars;
        samples.push(text);
    }

    samples
}

/// 从模型输出中解析上下文，取第一个 `{` 到最后一个 `}` 之间的内容
pub fn parse_context(response: &str) -> Option<IndustryContext> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }

    let context: IndustryContext = serde_json::from_str(&response[start..=end]).ok()?;
    if context.industry.trim().is_empty() {
        return None;
    }

    Some(context)
}

/// 请求模型分析页面上下文
pub async fn analyze_context(
    model: &dyn LanguageModel,
    api_key: &str,
    model_id: &str,
    units: &[TextUnit],
) -> Option<IndustryContext> {
    let samples = sample_segments(units);
    if samples.is_empty() {
        return None;
    }

    let request = CompletionRequest {
        api_key: api_key.to_string(),
        model_id: model_id.to_string(),
        system: SYSTEM_PROMPT.to_string(),
        prompt: samples.join("\n"),
        purpose: RequestPurpose::Context,
    };

    match model.complete(&request).await {
        Ok(response) => {
            let context = parse_context(&response);
            match &context {
                Some(context) => tracing::info!("页面上下文: {}", context.industry),
                None => tracing::debug!("上下文分析结果无法解析，忽略"),
            }
            context
        }
        Err(e) => {
            tracing::debug!("上下文分析失败，忽略: {}", e);
            None
        }
    }
}
