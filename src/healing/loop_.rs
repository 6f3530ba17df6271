use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{HealError, PathGuard};
use crate::healing::audit::AuditRecorder;
use crate::healing::engine::{AttemptBudget, HealingConfig};
use crate::healing::evidence::EvidenceCollector;
use crate::healing::patcher::PatchApplier;
use crate::healing::planner::{load_prompt_template, DiagnosisPlanner};
use crate::healing::runner::TestRunner;
use crate::healing::types::{
    ExecutionTimeline, HealingDecision, HealingOutcome, HealingReport, Stage,
};
use crate::llm::LlmClient;

/// 自愈循环：运行 → 取证 → 诊断 → 修补 → 回归，直到通过或预算耗尽
///
/// 每次非空修补都会直接覆盖源文件，即使随后回归失败也不回滚；后续尝试基于累积后的文件内容。
pub struct HealingLoop {
    config: HealingConfig,
    guard: PathGuard,
    runner: Arc<dyn TestRunner>,
    collector: EvidenceCollector,
    planner: DiagnosisPlanner,
    patcher: PatchApplier,
    recorder: AuditRecorder,
}

impl HealingLoop {
    pub fn new(llm: Arc<dyn LlmClient>, runner: Arc<dyn TestRunner>, config: HealingConfig) -> Self {
        let mut planner = DiagnosisPlanner::new(llm)
            .with_log_excerpt_chars(config.log_excerpt_chars)
            .with_override_threshold(config.heuristic_override_threshold);
        if let Some(template) = config.prompt_path.as_deref().and_then(load_prompt_template) {
            tracing::info!("Using custom healer prompt template");
            planner = planner.with_template(template);
        }

        let collector = if config.attach_screenshot {
            EvidenceCollector::with_screenshots(&config.results_dir)
        } else {
            EvidenceCollector::new()
        };

        Self {
            guard: PathGuard::new(&config.allowed_dirs),
            recorder: AuditRecorder::new(&config.artifacts_dir)
                .with_markdown(config.write_markdown_report),
            runner,
            collector,
            planner,
            patcher: PatchApplier::new(),
            config,
        }
    }

    /// 替换路径白名单（默认以当前工作目录为基准）
    pub fn with_path_guard(mut self, guard: PathGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn recorder(&self) -> &AuditRecorder {
        &self.recorder
    }

    /// 使用配置中的 max_retries
    pub async fn attempt_healing(&self, test_file: &str) -> HealingReport {
        self.attempt_healing_with_retries(test_file, self.config.max_retries)
            .await
    }

    pub async fn attempt_healing_with_retries(
        &self,
        test_file: &str,
        max_retries: usize,
    ) -> HealingReport {
        let mut timeline = ExecutionTimeline::new();
        let mut decisions = Vec::new();
        timeline.add_step(
            Stage::Start,
            format!("Healing session started for {}", test_file),
        );

        let (path, mut current_code) = match self.resolve_input(test_file).await {
            Ok(input) => input,
            Err(e) => return invalid_input(timeline, &e),
        };

        tracing::info!("--- Starting Healing Session: {} ---", path.display());

        let mut result = self.runner.run(&path).await;
        if result.passed() {
            timeline.add_step(Stage::InitialRun, "Test passed, no healing needed");
            tracing::info!("--- Healing Session Completed: Test passed initially ---");
            return HealingReport {
                outcome: HealingOutcome::NoHealingNeeded,
                decisions,
                timeline,
            };
        }
        timeline.add_step(
            Stage::FailureDetected,
            format!("Initial test run failed with {}", result.describe()),
        );

        let mut budget = AttemptBudget::new(max_retries);
        while budget.can_continue() {
            let attempt = budget.begin_attempt();
            tracing::info!("Healing Attempt {}/{}", attempt, budget.max_attempts());
            timeline.add_step(Stage::HealingAttempt, format!("Starting attempt {}", attempt));

            let evidence = self.collector.collect(&result);
            timeline.add_step(
                Stage::EvidenceCollected,
                if evidence.screenshot_path.is_some() {
                    "Logs and screenshot collected"
                } else {
                    "Logs collected (no screenshot available)"
                },
            );

            let mut decision = self.planner.plan(&path, &current_code, evidence).await;
            tracing::info!(failure_type = %decision.failure_type, hypothesis = %decision.hypothesis, "Diagnosis");
            timeline.add_step(
                Stage::AnalysisComplete,
                format!(
                    "Diagnosed as {}. Hypothesis: {}",
                    decision.failure_type, decision.hypothesis
                ),
            );

            let patch = self.patcher.apply_detailed(&current_code, &decision.action_taken);
            if patch.code == current_code {
                decision.verification_log = Some("Could not apply fix (code mismatch)".to_string());
                timeline.add_step(
                    Stage::ActionFailed,
                    "Proposed fix could not be applied (target code not found)",
                );
                self.record(&decision, &timeline);
                decisions.push(decision);
                continue;
            }

            timeline.add_step(
                Stage::SelectorUpdated,
                format!("Applied fix: {}", decision.action_taken.description),
            );
            if let Err(e) = tokio::fs::write(&path, &patch.code).await {
                tracing::error!(error = %e, "failed to write patched file");
                decision.verification_log = Some(format!("Could not write patched file: {}", e));
                timeline.add_step(Stage::ActionFailed, format!("Failed to write fix: {}", e));
                self.record(&decision, &timeline);
                decisions.push(decision);
                continue;
            }

            let verify = self.runner.run(&path).await;
            decision.verification_passed = verify.passed();
            decision.verification_log = Some(verify.verification_log());
            timeline.add_step(
                Stage::Verification,
                if decision.verification_passed {
                    "Test passed on re-run"
                } else {
                    "Test failed on re-run"
                },
            );
            self.record(&decision, &timeline);

            if decision.verification_passed {
                tracing::info!(
                    "--- Healing Session Completed: SUCCESS! Reasoning: {} ---",
                    decision.hypothesis
                );
                let outcome = HealingOutcome::Healed {
                    attempts: attempt,
                    hypothesis: decision.hypothesis.clone(),
                };
                decisions.push(decision);
                return HealingReport {
                    outcome,
                    decisions,
                    timeline,
                };
            }

            decisions.push(decision);
            current_code = patch.code;
            result = verify;
            timeline.add_step(Stage::Retry, "Preparing for next retry attempt");
        }

        timeline.add_step(
            Stage::HealingFailed,
            format!("Exhausted {} attempts without success", budget.used()),
        );
        tracing::info!(
            "--- Healing Session Completed: Failed to heal after {} attempts ---",
            budget.used()
        );
        HealingReport {
            outcome: HealingOutcome::Failed {
                attempts: budget.used(),
            },
            decisions,
            timeline,
        }
    }

    /// 校验路径并读取源码；非法路径、缺失或空文件在运行测试之前即终止会话
    async fn resolve_input(&self, test_file: &str) -> Result<(PathBuf, String), HealError> {
        let path = self.guard.validate(test_file)?;
        if !path.is_file() {
            return Err(HealError::FileNotFound(path));
        }
        let code = read_source(&path).await?;
        Ok((path, code))
    }

    /// 写审计产物；失败只记录日志，不影响会话
    fn record(&self, decision: &HealingDecision, timeline: &ExecutionTimeline) {
        if let Err(e) = self.recorder.emit(decision, timeline) {
            tracing::error!(error = %e, dir = %self.recorder.dir().display(), "failed to write audit artifacts");
        }
    }
}

async fn read_source(path: &Path) -> Result<String, HealError> {
    let code = tokio::fs::read_to_string(path).await?;
    if code.trim().is_empty() {
        return Err(HealError::EmptyFile(path.to_path_buf()));
    }
    Ok(code)
}

fn invalid_input(mut timeline: ExecutionTimeline, err: &HealError) -> HealingReport {
    if err.is_input_error() {
        tracing::warn!(error = %err, "rejected healing input");
    } else {
        tracing::error!(error = %err, "healing session aborted");
    }
    timeline.add_step(Stage::Error, err.to_string());
    HealingReport {
        outcome: HealingOutcome::InvalidInput {
            reason: err.to_string(),
        },
        decisions: Vec::new(),
        timeline,
    }
}

impl std::fmt::Debug for HealingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealingLoop")
            .field("config", &self.config)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
