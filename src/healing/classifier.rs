//! 启发式失败分类：日志文本 → (分类, 置信度, 依据)
//!
//! 纯函数、确定性、不会失败。规则按优先级排列，首个命中即返回；
//! 依据文本会写明触发的标记，供审计以及作为先验注入诊断 Prompt。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::healing::types::FailureType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub failure_type: FailureType,
    pub confidence: f64,
    pub rationale: String,
}

impl Classification {
    fn new(failure_type: FailureType, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            failure_type,
            confidence,
            rationale: rationale.into(),
        }
    }
}

const TIMEOUT_MARKERS: &[&str] = &["TimeoutError", "Test execution timed out"];
const TIMEOUT_PHRASES: &[&str] = &["waiting for selector"];
const CRASH_MARKERS: &[&str] = &["TargetClosedError"];
const CRASH_PHRASES: &[&str] = &["target closed", "browser has been closed"];
const STRICT_MODE_PHRASE: &str = "strict mode violation";
const ZERO_ELEMENTS_PHRASE: &str = "locator resolved to 0 elements";
const SUGGESTION_PHRASE: &str = "did you mean";
const NETWORK_ABORT_MARKER: &str = "net::ERR_ABORTED";
const JS_ERROR_MARKERS: &[&str] = &["ReferenceError", "TypeError"];

fn http_status_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(404|500)\b").expect("static regex"))
}

fn first_marker<'a>(haystack: &str, markers: &[&'a str]) -> Option<&'a str> {
    markers.iter().copied().find(|m| haystack.contains(m))
}

/// 按优先级分类；空日志返回 (UNKNOWN, 0.0)
pub fn classify(log: &str) -> Classification {
    if log.trim().is_empty() {
        return Classification::new(FailureType::Unknown, 0.0, "No logs available");
    }

    // 短语类标记不区分大小写，错误类名区分大小写
    let lower = log.to_lowercase();

    if let Some(marker) =
        first_marker(log, TIMEOUT_MARKERS).or_else(|| first_marker(&lower, TIMEOUT_PHRASES))
    {
        return Classification::new(
            FailureType::Timeout,
            1.0,
            format!("Detected '{}' in logs", marker),
        );
    }

    if let Some(marker) =
        first_marker(log, CRASH_MARKERS).or_else(|| first_marker(&lower, CRASH_PHRASES))
    {
        return Classification::new(
            FailureType::EnvironmentIssue,
            1.0,
            format!("Detected '{}': target closed or browser crashed", marker),
        );
    }

    if log.contains("expect(") && lower.contains("received") {
        return Classification::new(
            FailureType::AssertionFailed,
            1.0,
            "Detected 'expect(...)' assertion failure with 'received' value",
        );
    }

    if lower.contains(STRICT_MODE_PHRASE) {
        return Classification::new(
            FailureType::LocatorDrift,
            0.9,
            "Detected 'strict mode violation': multiple elements match selector",
        );
    }

    if lower.contains(ZERO_ELEMENTS_PHRASE) {
        if lower.contains(SUGGESTION_PHRASE) {
            return Classification::new(
                FailureType::LocatorDrift,
                0.8,
                "Detected 'locator resolved to 0 elements' with a 'Did you mean' suggestion",
            );
        }
        return Classification::new(
            FailureType::LocatorNotFound,
            0.7,
            "Detected 'locator resolved to 0 elements'",
        );
    }

    if log.contains(NETWORK_ABORT_MARKER) {
        return Classification::new(
            FailureType::PotentialAppDefect,
            0.8,
            format!("Detected network error '{}'", NETWORK_ABORT_MARKER),
        );
    }
    if let Some(status) = http_status_regex().find(log) {
        return Classification::new(
            FailureType::PotentialAppDefect,
            0.8,
            format!("Detected HTTP failure status '{}'", status.as_str()),
        );
    }

    if let Some(marker) = first_marker(log, JS_ERROR_MARKERS) {
        return Classification::new(
            FailureType::JavascriptError,
            0.7,
            format!("Detected JavaScript runtime error '{}'", marker),
        );
    }

    Classification::new(FailureType::Unknown, 0.0, "No specific pattern matched")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(log: &str) -> (FailureType, f64) {
        let c = classify(log);
        (c.failure_type, c.confidence)
    }

    #[test]
    fn test_empty_log() {
        assert_eq!(kind(""), (FailureType::Unknown, 0.0));
        assert_eq!(kind("   \n"), (FailureType::Unknown, 0.0));
    }

    #[test]
    fn test_timeout() {
        let c = classify("TimeoutError: page.goto: Timeout 30000ms exceeded.");
        assert_eq!(c.failure_type, FailureType::Timeout);
        assert_eq!(c.confidence, 1.0);
        assert!(c.rationale.contains("TimeoutError"));
    }

    #[test]
    fn test_waiting_for_selector() {
        assert_eq!(
            kind("Error: waiting for selector '#foo' failed"),
            (FailureType::Timeout, 1.0)
        );
    }

    #[test]
    fn test_runner_timeout_marker() {
        assert_eq!(
            kind("Test execution timed out after 60 seconds"),
            (FailureType::Timeout, 1.0)
        );
    }

    #[test]
    fn test_target_closed() {
        assert_eq!(
            kind("TargetClosedError: browser has been closed"),
            (FailureType::EnvironmentIssue, 1.0)
        );
        assert_eq!(
            kind("Error: Target closed"),
            (FailureType::EnvironmentIssue, 1.0)
        );
    }

    #[test]
    fn test_assertion_fail() {
        assert_eq!(
            kind("Error: expect(received).toBe(expected)\nExpected: 5\nReceived: 3"),
            (FailureType::AssertionFailed, 1.0)
        );
    }

    #[test]
    fn test_strict_mode_violation() {
        assert_eq!(
            kind("Error: strict mode violation: locator('button') resolved to 2 elements"),
            (FailureType::LocatorDrift, 0.9)
        );
    }

    #[test]
    fn test_zero_elements_with_suggestion() {
        assert_eq!(
            kind("locator resolved to 0 elements. Did you mean 'Submit Result'?"),
            (FailureType::LocatorDrift, 0.8)
        );
    }

    #[test]
    fn test_zero_elements() {
        assert_eq!(
            kind("locator resolved to 0 elements"),
            (FailureType::LocatorNotFound, 0.7)
        );
    }

    #[test]
    fn test_app_defects() {
        assert_eq!(
            kind("page.goto: net::ERR_ABORTED at http://localhost/"),
            (FailureType::PotentialAppDefect, 0.8)
        );
        let c = classify("Response status 500 from /api/login");
        assert_eq!(c.failure_type, FailureType::PotentialAppDefect);
        assert!(c.rationale.contains("500"));
        assert_eq!(
            kind("GET /missing returned 404"),
            (FailureType::PotentialAppDefect, 0.8)
        );
    }

    #[test]
    fn test_status_token_needs_word_boundary() {
        // 30000ms 中的数字不应被当作 HTTP 状态码
        assert_eq!(kind("took 15000ms then ReferenceError: x is not defined").0, FailureType::JavascriptError);
    }

    #[test]
    fn test_javascript_error() {
        assert_eq!(
            kind("ReferenceError: foo is not defined"),
            (FailureType::JavascriptError, 0.7)
        );
        assert_eq!(
            kind("TypeError: cannot read properties of undefined"),
            (FailureType::JavascriptError, 0.7)
        );
    }

    #[test]
    fn test_unmatched() {
        assert_eq!(kind("something odd happened"), (FailureType::Unknown, 0.0));
    }

    #[test]
    fn test_precedence_timeout_over_assertion() {
        let log = "TimeoutError: waited too long\nError: expect(received).toBe(expected)";
        assert_eq!(kind(log), (FailureType::Timeout, 1.0));
    }

    #[test]
    fn test_precedence_crash_over_locator() {
        let log = "locator resolved to 0 elements\nTargetClosedError: browser has been closed";
        assert_eq!(kind(log).0, FailureType::EnvironmentIssue);
    }

    #[test]
    fn test_precedence_strict_mode_over_http_status() {
        let log = "strict mode violation: resolved to 2 elements\nstatus 404";
        assert_eq!(kind(log), (FailureType::LocatorDrift, 0.9));
    }
}
