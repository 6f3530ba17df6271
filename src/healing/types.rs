use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 失败分类：封闭枚举，UNKNOWN 为无规则命中时的安全默认值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    LocatorNotFound,
    LocatorDrift,
    Timeout,
    AssertionFailed,
    EnvironmentIssue,
    PotentialAppDefect,
    JavascriptError,
    #[default]
    Unknown,
}

impl FailureType {
    pub const ALL: [FailureType; 8] = [
        FailureType::LocatorNotFound,
        FailureType::LocatorDrift,
        FailureType::Timeout,
        FailureType::AssertionFailed,
        FailureType::EnvironmentIssue,
        FailureType::PotentialAppDefect,
        FailureType::JavascriptError,
        FailureType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::LocatorNotFound => "LOCATOR_NOT_FOUND",
            FailureType::LocatorDrift => "LOCATOR_DRIFT",
            FailureType::Timeout => "TIMEOUT",
            FailureType::AssertionFailed => "ASSERTION_FAILED",
            FailureType::EnvironmentIssue => "ENVIRONMENT_ISSUE",
            FailureType::PotentialAppDefect => "POTENTIAL_APP_DEFECT",
            FailureType::JavascriptError => "JAVASCRIPT_ERROR",
            FailureType::Unknown => "UNKNOWN",
        }
    }

    /// 宽松解析推理服务返回的分类名：忽略大小写、前后空白与 `FailureType.` 前缀，无法识别时为 Unknown
    pub fn parse_lenient(raw: &str) -> Self {
        let name = raw.trim();
        let name = name.strip_prefix("FailureType.").unwrap_or(name);
        let normalized = name.replace(['-', ' '], "_").to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(FailureType::Unknown)
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次失败运行的证据：日志 + 可选截图路径（只记录路径，不管理文件生命周期）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub error_log: String,
    pub screenshot_path: Option<PathBuf>,
    /// 预留，当前未使用
    pub dom_snippet: Option<String>,
}

impl Evidence {
    pub fn from_log(error_log: impl Into<String>) -> Self {
        Self {
            error_log: error_log.into(),
            screenshot_path: None,
            dom_snippet: None,
        }
    }

    pub fn with_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = Some(path.into());
        self
    }

    /// 按字符（而非字节）截断日志
    pub fn log_excerpt(&self, max_chars: usize) -> &str {
        match self.error_log.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &self.error_log[..byte_idx],
            None => &self.error_log,
        }
    }
}

/// 推理服务提出的代码修改：原代码块 → 新代码块
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingAction {
    pub original_code: String,
    pub fixed_code: String,
    pub description: String,
}

impl HealingAction {
    pub fn new(
        original_code: impl Into<String>,
        fixed_code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            original_code: original_code.into(),
            fixed_code: fixed_code.into(),
            description: description.into(),
        }
    }

    pub fn none() -> Self {
        Self::new("", "", "No action")
    }

    /// 任一代码字段为空即视为空操作
    pub fn is_noop(&self) -> bool {
        self.original_code.is_empty() || self.fixed_code.is_empty()
    }
}

/// 单次尝试的结构化诊断与修复记录；verification_* 由编排器在回归后填写
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingDecision {
    pub test_file: PathBuf,
    pub failure_type: FailureType,
    pub failure_summary: String,
    pub evidence: Evidence,
    pub hypothesis: String,
    pub confidence_score: f64,
    pub reasoning_steps: Vec<String>,
    pub action_taken: HealingAction,
    #[serde(default)]
    pub verification_passed: bool,
    #[serde(default)]
    pub verification_log: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl HealingDecision {
    /// 推理失败时的降级决策：UNKNOWN、置信度 0、空动作，失败原因写入 summary 与 reasoning_steps
    pub fn degraded(test_file: &Path, evidence: Evidence, reason: &str) -> Self {
        Self {
            test_file: test_file.to_path_buf(),
            failure_type: FailureType::Unknown,
            failure_summary: format!("Agent failed to analyze: {}", reason),
            evidence,
            hypothesis: "Fallback: Manual intervention needed".to_string(),
            confidence_score: 0.0,
            reasoning_steps: vec!["LLM call failed".to_string(), reason.to_string()],
            action_taken: HealingAction::none(),
            verification_passed: false,
            verification_log: None,
            timestamp: Local::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 人类可读的 Markdown 报告
    pub fn to_markdown(&self) -> String {
        let (icon, status) = if self.verification_passed {
            ("✅", "Fixed")
        } else {
            ("❌", "Failed")
        };
        let error_excerpt = self.evidence.log_excerpt(200);
        let screenshot = self
            .evidence
            .screenshot_path
            .as_ref()
            .map(|p| format!("![Screenshot]({})", p.display()))
            .unwrap_or_else(|| "(none)".to_string());
        let reasoning = self
            .reasoning_steps
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"# Healing Report: {timestamp}
**File:** `{file}`
**Status:** {icon} {status}

## Diagnosis
- **Type:** `{failure_type}`
- **Summary:** {summary}

## Evidence
- **Error:** `{error}...`
- **Screenshot:** {screenshot}

## Resolution
**Hypothesis:** {hypothesis}
**Confidence:** {confidence:.2}

**Reasoning:**
{reasoning}

## Code Change
```typescript
// OLD
{old}

// NEW
{new}
```
"#,
            timestamp = self.timestamp.to_rfc3339(),
            file = self.test_file.display(),
            failure_type = self.failure_type,
            summary = self.failure_summary,
            error = error_excerpt,
            hypothesis = self.hypothesis,
            confidence = self.confidence_score,
            old = self.action_taken.original_code,
            new = self.action_taken.fixed_code,
        )
    }
}

/// 会话状态机中的各个阶段，也是时间线步骤名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Start,
    Error,
    InitialRun,
    FailureDetected,
    HealingAttempt,
    EvidenceCollected,
    AnalysisComplete,
    ActionFailed,
    SelectorUpdated,
    Verification,
    Retry,
    HealingFailed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    #[serde(rename = "step")]
    pub step_name: String,
    pub details: String,
    pub timestamp: DateTime<Local>,
}

/// 会话级只追加时间线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTimeline {
    session_id: Uuid,
    steps: Vec<TimelineStep>,
}

impl ExecutionTimeline {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, stage: Stage, details: impl Into<String>) {
        let details = details.into();
        tracing::debug!(step = %stage, %details, "timeline");
        self.steps.push(TimelineStep {
            step_name: stage.to_string(),
            details,
            timestamp: Local::now(),
        });
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn steps(&self) -> &[TimelineStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_name.as_str()).collect()
    }

    pub fn last(&self) -> Option<&TimelineStep> {
        self.steps.last()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话的终态
#[derive(Debug, Clone, PartialEq)]
pub enum HealingOutcome {
    /// 初次运行即通过，未消耗任何重试预算
    NoHealingNeeded,
    Healed { attempts: usize, hypothesis: String },
    Failed { attempts: usize },
    /// 路径非法 / 文件不存在 / 文件为空
    InvalidInput { reason: String },
}

impl HealingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HealingOutcome::NoHealingNeeded | HealingOutcome::Healed { .. })
    }

    /// 面向用户的终态文本
    pub fn message(&self) -> String {
        match self {
            HealingOutcome::NoHealingNeeded => "Test passed (No healing needed).".to_string(),
            HealingOutcome::Healed { hypothesis, .. } => {
                format!("SUCCESS: Test healed! \nReasoning: {}", hypothesis)
            }
            HealingOutcome::Failed { .. } => "Healing failed to make test pass.".to_string(),
            HealingOutcome::InvalidInput { reason } => format!("Error: {}", reason),
        }
    }
}

impl fmt::Display for HealingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// 一次会话的完整结果：终态 + 各次决策 + 时间线
#[derive(Debug, Clone)]
pub struct HealingReport {
    pub outcome: HealingOutcome,
    pub decisions: Vec<HealingDecision>,
    pub timeline: ExecutionTimeline,
}
