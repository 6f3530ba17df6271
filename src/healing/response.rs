//! 推理服务回复的防御式解析
//!
//! 回复是自由文本：可能带 Markdown 围栏、前后夹杂说明文字、字符串里混入控制字符或裸换行。
//! 这里负责把它变成 ProposalPayload；字段缺失时取默认值，代码字段允许是「行数组」。

use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::core::HealError;
use crate::healing::types::HealingAction;

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)```").expect("static regex")
    })
}

fn control_chars_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("static regex"))
}

/// 从回复中取出 JSON 文本
///
/// 1. 有 ```json 围栏时取围栏内容
/// 2. 否则取第一个 `{` 到最后一个 `}`
/// 3. 都没有时原样返回
///
/// 最后去掉除 \n \r \t 以外的控制字符。
pub fn extract_json_block(response: &str) -> String {
    if response.trim().is_empty() {
        return "{}".to_string();
    }

    let json = if let Some(caps) = fence_regex().captures(response) {
        caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default()
    } else {
        match (response.find('{'), response.rfind('}')) {
            (Some(start), Some(end)) if start < end => &response[start..=end],
            _ => response,
        }
    };

    control_chars_regex().replace_all(json, "").into_owned()
}

/// 字符串字面量内的裸换行 / 制表符转成转义序列，其余原样保留
fn escape_raw_whitespace_in_strings(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

/// 代码字段：字符串，或按行拆开的字符串数组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CodeText {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CodeText {
    fn default() -> Self {
        CodeText::Text(String::new())
    }
}

impl CodeText {
    /// 行数组以换行拼接
    pub fn into_string(self) -> String {
        match self {
            CodeText::Text(s) => s,
            CodeText::Lines(lines) => lines.join("\n"),
        }
    }

    /// 单个字符串视为一项
    pub fn into_lines(self) -> Vec<String> {
        match self {
            CodeText::Text(s) if s.trim().is_empty() => Vec::new(),
            CodeText::Text(s) => vec![s],
            CodeText::Lines(lines) => lines,
        }
    }
}

/// 置信度：数字或数字字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Score {
    Number(f64),
    Text(String),
}

impl Score {
    /// 无法解析或非有限值时为 0，结果限制在 [0, 1]
    pub fn value(&self) -> f64 {
        let raw = match self {
            Score::Number(n) => *n,
            Score::Text(s) => s.trim().parse().unwrap_or(0.0),
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionPayload {
    /// 文件中现有的、需要被替换的代码块（逐字复制）
    #[serde(default)]
    pub original_code: Option<CodeText>,
    /// 替换后的代码块
    #[serde(default)]
    pub fixed_code: Option<CodeText>,
    /// 一句话描述本次修改
    #[serde(default)]
    pub description: Option<String>,
}

impl From<ActionPayload> for HealingAction {
    fn from(p: ActionPayload) -> Self {
        HealingAction::new(
            p.original_code.map(CodeText::into_string).unwrap_or_default(),
            p.fixed_code.map(CodeText::into_string).unwrap_or_default(),
            p.description.unwrap_or_default(),
        )
    }
}

/// 推理服务必须返回的 JSON 对象
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposalPayload {
    /// LOCATOR_NOT_FOUND | LOCATOR_DRIFT | TIMEOUT | ASSERTION_FAILED | ENVIRONMENT_ISSUE | POTENTIAL_APP_DEFECT | JAVASCRIPT_ERROR | UNKNOWN
    #[serde(default)]
    pub failure_type: Option<String>,
    #[serde(default)]
    pub failure_summary: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<String>,
    /// 0.0 - 1.0
    #[serde(default)]
    pub confidence_score: Option<Score>,
    /// 字符串数组；单个字符串也接受
    #[serde(default)]
    pub reasoning_steps: Option<CodeText>,
    #[serde(default)]
    pub action_taken: Option<ActionPayload>,
}

impl ProposalPayload {
    /// 缺失或为 null 时为空
    pub fn steps(&self) -> Vec<String> {
        self.reasoning_steps
            .clone()
            .map(CodeText::into_lines)
            .unwrap_or_default()
    }

    /// 缺失或为 null 时为空动作
    pub fn action(&self) -> HealingAction {
        self.action_taken
            .clone()
            .map(HealingAction::from)
            .unwrap_or_default()
    }
}

/// 解析推理服务的原始回复
pub fn parse_proposal(response: &str) -> Result<ProposalPayload, HealError> {
    let json = extract_json_block(response);
    let json = escape_raw_whitespace_in_strings(&json);
    let payload = serde_json::from_str(&json)?;
    Ok(payload)
}

/// 输出契约的 JSON Schema，拼入 system prompt
pub fn proposal_schema_json() -> String {
    let schema = schema_for!(ProposalPayload);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json() {
        let text = r#"{"foo": "bar"}"#;
        assert_eq!(extract_json_block(text), text);
    }

    #[test]
    fn test_markdown_json() {
        let text = "```json\n{\"foo\": \"bar\"}\n```";
        assert_eq!(extract_json_block(text), r#"{"foo": "bar"}"#);
    }

    #[test]
    fn test_unlabelled_fence() {
        let text = "Here you go:\n```\n{\"foo\": 1}\n```\nthanks";
        assert_eq!(extract_json_block(text), r#"{"foo": 1}"#);
    }

    #[test]
    fn test_surrounding_text() {
        let text = "Here is the json:\n{\"foo\": \"bar\"}\nHope it helps.";
        assert_eq!(extract_json_block(text), r#"{"foo": "bar"}"#);
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json_block("Just some text"), "Just some text");
        assert_eq!(extract_json_block(""), "{}");
    }

    #[test]
    fn test_control_chars_removed() {
        let text = "{\"foo\": \"b\u{0007}ar\u{0000}\"}";
        assert_eq!(extract_json_block(text), r#"{"foo": "bar"}"#);
    }

    #[test]
    fn test_parse_full_payload() {
        let raw = r#"Sure! Here is my diagnosis:
```json
{
  "failure_type": "LOCATOR_DRIFT",
  "failure_summary": "Button text changed",
  "hypothesis": "The submit button was renamed",
  "confidence_score": 0.85,
  "reasoning_steps": ["Log says 0 elements", "Did you mean suggests new text"],
  "action_taken": {
    "original_code": "await page.click('text=Submit');",
    "fixed_code": "await page.click('text=Send');",
    "description": "Use new button label"
  }
}
```"#;
        let p = parse_proposal(raw).unwrap();
        assert_eq!(p.failure_type.as_deref(), Some("LOCATOR_DRIFT"));
        assert_eq!(p.confidence_score.as_ref().unwrap().value(), 0.85);
        assert_eq!(p.steps().len(), 2);
        let action = p.action();
        assert_eq!(action.fixed_code, "await page.click('text=Send');");
    }

    #[test]
    fn test_list_valued_code_fields_are_joined() {
        let raw = r#"{"action_taken": {"original_code": ["a();", "b();"], "fixed_code": ["a();", "c();"], "description": "d"}}"#;
        let action = parse_proposal(raw).unwrap().action();
        assert_eq!(action.original_code, "a();\nb();");
        assert_eq!(action.fixed_code, "a();\nc();");
    }

    #[test]
    fn test_raw_newlines_inside_strings() {
        let raw = "{\"action_taken\": {\"original_code\": \"line1\n\tline2\", \"fixed_code\": \"x\", \"description\": \"\"}}";
        let action = parse_proposal(raw).unwrap().action();
        assert_eq!(action.original_code, "line1\n\tline2");
    }

    #[test]
    fn test_missing_fields_default() {
        let p = parse_proposal("{}").unwrap();
        assert!(p.failure_type.is_none());
        assert!(p.steps().is_empty());
        assert!(p.action().is_noop());
    }

    #[test]
    fn test_null_fields_keep_the_fix() {
        let raw = r#"{"failure_type": null, "confidence_score": null, "reasoning_steps": null,
            "action_taken": {"original_code": "a();", "fixed_code": "b();", "description": null}}"#;
        let p = parse_proposal(raw).unwrap();
        assert!(p.steps().is_empty());
        let action = p.action();
        assert!(!action.is_noop());
        assert_eq!(action.original_code, "a();");
        assert_eq!(action.fixed_code, "b();");
        assert_eq!(action.description, "");
    }

    #[test]
    fn test_single_string_reasoning_step() {
        let p = parse_proposal(r#"{"reasoning_steps": "one step", "action_taken": null}"#).unwrap();
        assert_eq!(p.steps(), vec!["one step".to_string()]);
        assert!(p.action().is_noop());
    }

    #[test]
    fn test_null_code_field_is_noop() {
        let raw = r#"{"action_taken": {"original_code": null, "fixed_code": "b();"}}"#;
        assert!(parse_proposal(raw).unwrap().action().is_noop());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_proposal("I cannot help with that").is_err());
    }

    #[test]
    fn test_score_parsing() {
        assert_eq!(Score::Text("0.4".into()).value(), 0.4);
        assert_eq!(Score::Text("high".into()).value(), 0.0);
        assert_eq!(Score::Number(3.0).value(), 1.0);
        assert_eq!(Score::Number(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = proposal_schema_json();
        assert!(schema.contains("action_taken"));
        assert!(schema.contains("reasoning_steps"));
    }
}
