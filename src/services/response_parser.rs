//! 双语回复解析 - 业务能力层
//!
//! 从最终（或部分）回复文本中提取 `["目标语言", "参考语言"]` 两段内容。
//! 解析失败不是错误：目标语言退化为原始文本，参考语言为固定的占位标记。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// 解析失败时参考语言的占位文本
pub const UNPARSED_SENTINEL: &str = "(Parse failed, showing raw content)";

/// 双语回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualAnswer {
    /// 目标语言文本（工单语言）
    pub target_text: String,
    /// 参考语言文本（中文）
    pub reference_text: String,
    /// 是否成功解析出两段内容
    pub parsed: bool,
}

impl BilingualAnswer {
    fn pair(target: String, reference: String) -> Self {
        Self {
            target_text: target,
            reference_text: reference,
            parsed: true,
        }
    }

    fn raw(text: &str) -> Self {
        Self {
            target_text: text.to_string(),
            reference_text: UNPARSED_SENTINEL.to_string(),
            parsed: false,
        }
    }
}

fn fallback_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)^\[\s*"(.*?)"\s*,\s*"(.*?)"\s*\]$"#).expect("fallback regex is valid")
    })
}

/// 解析回复，总是返回结果
pub fn parse_answer(text: &str) -> BilingualAnswer {
    match extract_pair(text) {
        Some((target, reference)) => BilingualAnswer::pair(target, reference),
        None => {
            debug!("回复无法解析为双语数组，使用原始文本");
            BilingualAnswer::raw(text)
        }
    }
}

/// 对流式的部分回复做预览解析
///
/// 只有同时包含 `[` 和 `]` 时才尝试，否则返回 None。
pub fn try_parse_partial(text: &str) -> Option<BilingualAnswer> {
    if !(text.contains('[') && text.contains(']')) {
        return None;
    }
    extract_pair(text).map(|(t, r)| BilingualAnswer::pair(t, r))
}

/// 截取第一个 `[` 到最后一个 `]` 之间的部分
pub fn slice_json_array(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn extract_pair(text: &str) -> Option<(String, String)> {
    let candidate = slice_json_array(text);
    strict_pair(candidate).or_else(|| {
        let pair = regex_pair(candidate);
        if pair.is_some() {
            debug!("使用正则兜底提取双语回复");
        }
        pair
    })
}

fn strict_pair(candidate: &str) -> Option<(String, String)> {
    let parsed: JsonValue = serde_json::from_str(candidate).ok()?;
    let items = parsed.as_array()?;
    if items.len() < 2 {
        return None;
    }
    Some((value_text(&items[0]), value_text(&items[1])))
}

fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn regex_pair(candidate: &str) -> Option<(String, String)> {
    let caps = fallback_regex().captures(candidate)?;
    Some((unescape(&caps[1]), unescape(&caps[2])))
}

fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_json() {
        let answer = parse_answer(r#"["hello", "你好"]"#);
        assert!(answer.parsed);
        assert_eq!(answer.target_text, "hello");
        assert_eq!(answer.reference_text, "你好");
    }

    #[test]
    fn test_parse_with_preface() {
        let answer = parse_answer(r#"preface...["hello","你好"]"#);
        assert_eq!(answer.target_text, "hello");
        assert_eq!(answer.reference_text, "你好");
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let answer = parse_answer("Here you go:\n[\"Dear customer\", \"尊敬的客户\"]\nThanks");
        assert!(answer.parsed);
        assert_eq!(answer.target_text, "Dear customer");
        assert_eq!(answer.reference_text, "尊敬的客户");
    }

    #[test]
    fn test_parse_literal_newline_fallback() {
        let answer = parse_answer("[\"line1\nline2\", \"参考\"]");
        assert!(answer.parsed);
        assert_eq!(answer.target_text, "line1\nline2");
        assert_eq!(answer.reference_text, "参考");
    }

    #[test]
    fn test_parse_without_brackets_degrades() {
        let answer = parse_answer("plain reply");
        assert!(!answer.parsed);
        assert_eq!(answer.target_text, "plain reply");
        assert_eq!(answer.reference_text, UNPARSED_SENTINEL);
    }

    #[test]
    fn test_parse_non_string_elements() {
        let answer = parse_answer("[42, true]");
        assert_eq!(answer.target_text, "42");
        assert_eq!(answer.reference_text, "true");
    }

    #[test]
    fn test_partial_requires_both_brackets() {
        assert!(try_parse_partial(r#"["hel"#).is_none());
        let preview = try_parse_partial(r#"["hello", "你好"]"#);
        assert_eq!(preview.map(|p| p.target_text), Some("hello".to_string()));
    }
}
