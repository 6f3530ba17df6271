//! 诊断规划：启发式先验 + 推理服务 → HealingDecision
//!
//! 推理调用或解析的任何失败都不会向上传播，而是返回一个降级决策（UNKNOWN、空动作），
//! 以便自愈循环继续下一次尝试。

use std::path::Path;
use std::sync::Arc;

use chrono::Local;

use crate::healing::classifier::{classify, Classification};
use crate::healing::response::{parse_proposal, proposal_schema_json};
use crate::healing::types::{Evidence, FailureType, HealingDecision};
use crate::llm::{LlmClient, Message};

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior QA automation engineer who repairs failing end-to-end UI tests.

A deterministic log classifier has already inspected the failure:
- Heuristic category: {failure_type}
- Heuristic confidence: {confidence}
- Trigger: {reason}

Use this as prior context. If you agree, keep the category; if the evidence clearly points elsewhere, choose another category and explain why.

Rules for the fix:
1. `original_code` must be copied verbatim from the broken file (a contiguous block of whole lines).
2. `fixed_code` replaces exactly that block; keep it minimal.
3. Never invent code outside the block you quote.
4. If no safe fix exists, return empty strings for both code fields.

Respond with a single JSON object and nothing else, with the fields:
failure_type, failure_summary, hypothesis, confidence_score, reasoning_steps (list of strings),
action_taken {original_code, fixed_code, description}.

JSON Schema of the expected object:
{schema}"#;

/// 读取自定义 system prompt 模板；文件不存在或读取失败时返回 None（使用内置模板）
pub fn load_prompt_template(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read prompt template");
            None
        }
    }
}

pub struct DiagnosisPlanner {
    llm: Arc<dyn LlmClient>,
    template: String,
    log_excerpt_chars: usize,
    override_threshold: f64,
}

impl DiagnosisPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            template: DEFAULT_SYSTEM_PROMPT.to_string(),
            log_excerpt_chars: 2000,
            override_threshold: 0.8,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_log_excerpt_chars(mut self, chars: usize) -> Self {
        self.log_excerpt_chars = chars;
        self
    }

    pub fn with_override_threshold(mut self, threshold: f64) -> Self {
        self.override_threshold = threshold;
        self
    }

    pub fn system_prompt(&self, prior: &Classification) -> String {
        self.template
            .replace("{failure_type}", prior.failure_type.as_str())
            .replace("{confidence}", &format!("{:.1}", prior.confidence))
            .replace("{reason}", &prior.rationale)
            .replace("{schema}", &proposal_schema_json())
    }

    pub fn user_prompt(&self, test_file: &Path, current_code: &str, evidence: &Evidence) -> String {
        format!(
            "FILE: {}\n\nBROKEN CODE:\n```typescript\n{}\n```\n\nERROR LOGS:\n{}",
            test_file.display(),
            current_code,
            evidence.log_excerpt(self.log_excerpt_chars)
        )
    }

    pub async fn plan(
        &self,
        test_file: &Path,
        current_code: &str,
        evidence: Evidence,
    ) -> HealingDecision {
        let prior = classify(&evidence.error_log);
        tracing::info!(
            heuristic = %prior.failure_type,
            confidence = prior.confidence,
            reason = %prior.rationale,
            "heuristic classification"
        );

        let messages = [
            Message::system(self.system_prompt(&prior)),
            Message::user(self.user_prompt(test_file, current_code, &evidence)),
        ];
        tracing::debug!(
            system_chars = messages[0].content.len(),
            user_chars = messages[1].content.len(),
            "sending diagnosis request"
        );

        let raw = match self.llm.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "LLM analysis error");
                return HealingDecision::degraded(test_file, evidence, &e);
            }
        };

        let payload = match parse_proposal(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "could not parse LLM proposal");
                return HealingDecision::degraded(test_file, evidence, &e.to_string());
            }
        };

        let mut reasoning_steps = payload.steps();
        let action_taken = payload.action();
        let proposed = payload
            .failure_type
            .as_deref()
            .map(FailureType::parse_lenient)
            .unwrap_or(FailureType::Unknown);
        let failure_type = self.resolve_failure_type(proposed, &prior);
        if failure_type != proposed {
            reasoning_steps.push(format!(
                "Heuristic override: reasoner was undecided, using {} ({})",
                failure_type, prior.rationale
            ));
        }

        HealingDecision {
            test_file: test_file.to_path_buf(),
            failure_type,
            failure_summary: payload
                .failure_summary
                .unwrap_or_else(|| "No summary provided".to_string()),
            evidence,
            hypothesis: payload
                .hypothesis
                .unwrap_or_else(|| "No hypothesis".to_string()),
            confidence_score: payload
                .confidence_score
                .map(|s| s.value())
                .unwrap_or(0.0),
            reasoning_steps,
            action_taken,
            verification_passed: false,
            verification_log: None,
            timestamp: Local::now(),
        }
    }

    /// 明确的非 UNKNOWN 回答总是胜出；推理服务犹豫不决且启发式足够确定时采用启发式
    fn resolve_failure_type(&self, proposed: FailureType, prior: &Classification) -> FailureType {
        if proposed == FailureType::Unknown && prior.confidence > self.override_threshold {
            prior.failure_type
        } else {
            proposed
        }
    }
}
