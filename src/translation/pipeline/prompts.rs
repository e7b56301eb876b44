//! 提示词构建与响应解析
//!
//! 批次请求中的每个文本占一行，形如 `[i] text`，i 从 0 开始。
//! 响应按同样的索引标记逐行还原；索引恢复不足一半时退回按行位置对齐。

use std::sync::OnceLock;

use regex::Regex;

use super::context::IndustryContext;
use crate::translation::storage::normalize;

static INDEXED_LINE: OnceLock<Option<Regex>> = OnceLock::new();
static LEADING_TAG: OnceLock<Option<Regex>> = OnceLock::new();

fn indexed_line() -> Option<&'static Regex> {
    INDEXED_LINE
        .get_or_init(|| Regex::new(r"^\[(\d+)\]\s*(.+)$").ok())
        .as_ref()
}

fn leading_tag() -> Option<&'static Regex> {
    LEADING_TAG
        .get_or_init(|| Regex::new(r"^\[\d+\]\s*").ok())
        .as_ref()
}

/// 批次翻译的系统指令
pub fn translation_system_prompt(target_language: &str, context: Option<&IndustryContext>) -> String {
    let mut prompt = format!(
        "You are a professional translator. Translate each numbered line into {}.\n\
         Rules:\n\
         - Keep the [n] marker at the start of every line and output exactly one line per input line.\n\
         - Output only the translations, no explanations.\n\
         - Keep numbers, URLs, code identifiers and brand names unchanged.",
        target_language
    );

    if let Some(context) = context {
        prompt.push_str(&format!(
            "\nThe page belongs to the {} domain. Use its established terminology",
            context.industry
        ));
        if !context.keywords.is_empty() {
            prompt.push_str(&format!(" (key terms: {})", context.keywords.join(", ")));
        }
        prompt.push('.');
        if !context.tone.is_empty() {
            prompt.push_str(&format!(" Match a {} tone.", context.tone));
        }
    }

    prompt
}

/// 构建批次提示词，每行 `[i] text`，行内空白被压缩
pub fn build_batch_prompt<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("[{}] {}", i, normalize(text.as_ref())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 解析批次响应，结果长度恒为 `expected`，缺失位置为 `None`
pub fn parse_batch_response(response: &str, expected: usize) -> Vec<Option<String>> {
    let mut results: Vec<Option<String>> = vec![None; expected];
    if expected == 0 {
        return results;
    }

    if let Some(regex) = indexed_line() {
        for line in response.lines() {
            let Some(captures) = regex.captures(line.trim()) else {
                continue;
            };
            let (Some(index), Some(text)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let Ok(index) = index.as_str().parse::<usize>() else {
                continue;
            };
            let text = text.as_str().trim();
            if index < expected && results[index].is_none() && !text.is_empty() {
                results[index] = Some(text.to_string());
            }
        }
    }

    let recovered = results.iter().filter(|result| result.is_some()).count();
    if recovered * 2 >= expected {
        return results;
    }

    tracing::debug!(
        "索引标记仅恢复 {}/{} 条，改为按行位置对齐",
        recovered,
        expected
    );
    positional_fallback(response, expected)
}

fn positional_fallback(response: &str, expected: usize) -> Vec<Option<String>> {
    let mut lines = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match leading_tag() {
            Some(regex) => regex.replace(line, "").trim().to_string(),
            None => line.to_string(),
        });

    (0..expected)
        .map(|_| lines.next().filter(|line| !line.is_empty()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_batch_prompt() {
        let prompt = build_batch_prompt(&["Hello\n  world", "  Second  "]);
        assert_eq!(prompt, "[0] Hello world\n[1] Second");
    }

    #[test]
    fn test_parse_indexed_out_of_order() {
        let response = "[1] Deux\n[0] Un\n\n[2]Trois";
        assert_eq!(
            parse_batch_response(response, 3),
            vec![Some("Un".into()), Some("Deux".into()), Some("Trois".into())]
        );
    }

    #[test]
    fn test_parse_missing_indices_become_none() {
        let response = "[0] Un\n[2] Trois\n[3] Quatre";
        assert_eq!(
            parse_batch_response(response, 4),
            vec![Some("Un".into()), None, Some("Trois".into()), Some("Quatre".into())]
        );
    }

    #[test]
    fn test_parse_ignores_out_of_range_and_noise() {
        let response = "Sure! Here you go:\n[0] Un\n[9] Neuf\n[1] Deux";
        assert_eq!(
            parse_batch_response(response, 2),
            vec![Some("Un".into()), Some("Deux".into())]
        );
    }

    #[test]
    fn test_positional_fallback_when_markers_dropped() {
        let response = "Un\n\nDeux\n[7] Trois";
        assert_eq!(
            parse_batch_response(response, 3),
            vec![Some("Un".into()), Some("Deux".into()), Some("Trois".into())]
        );
    }

    #[test]
    fn test_fallback_pads_short_response() {
        assert_eq!(
            parse_batch_response("Only one", 3),
            vec![Some("Only one".into()), None, None]
        );
        assert!(parse_batch_response("", 0).is_empty());
    }

    #[test]
    fn test_system_prompt_mentions_context() {
        let context = IndustryContext {
            industry: "healthcare".into(),
            keywords: vec!["patient".into(), "dosage".into()],
            tone: "formal".into(),
            rationale: String::new(),
        };
        let prompt = translation_system_prompt("German", Some(&context));

        assert!(prompt.contains("German"));
        assert!(prompt.contains("healthcare"));
        assert!(prompt.contains("patient, dosage"));
        assert!(!translation_system_prompt("German", None).contains("domain"));
    }
}
