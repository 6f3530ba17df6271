//! 自愈集成测试：真实读写文件的执行器 + Mock 推理服务

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use healer::healing::{
        AuditRecorder, FailureType, HealingConfig, HealingLoop, HealingOutcome, RunResult,
        TestRunner,
    };
    use healer::llm::MockLlmClient;
    use healer::PathGuard;

    const BROKEN: &str = "import { test, expect } from '@playwright/test';\n\ntest('checkout', async ({ page }) => {\n    await page.goto('/cart');\n    await page.locator('.btn-checkout').click();\n    await expect(page).toHaveURL('/checkout');\n});\n";

    /// 文件中出现 good 标记才算通过；否则给出 Playwright 风格的定位失败日志
    struct ContentRunner {
        good: &'static str,
        runs: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TestRunner for ContentRunner {
        async fn run(&self, test_file: &Path) -> RunResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let code = std::fs::read_to_string(test_file).unwrap_or_default();
            if code.contains(self.good) {
                RunResult::Completed {
                    exit_code: 0,
                    stdout: "1 passed (1.2s)".to_string(),
                    stderr: String::new(),
                }
            } else {
                RunResult::Completed {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "\u{1b}[31mError: locator.click: Timeout 30000ms exceeded.\u{1b}[39m\n  waiting for locator('.btn-checkout')\n  locator resolved to 0 elements. Did you mean getByTestId('checkout')?".to_string(),
                }
            }
        }
    }

    fn setup() -> (tempfile::TempDir, PathBuf, HealingConfig) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tests/generated");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("checkout.spec.ts");
        std::fs::write(&file, BROKEN).unwrap();
        let config = HealingConfig {
            max_retries: 2,
            attach_screenshot: false,
            artifacts_dir: tmp.path().join("tests/artifacts"),
            allowed_dirs: vec![PathBuf::from("tests/generated")],
            write_markdown_report: true,
            prompt_path: None,
            ..HealingConfig::default()
        };
        (tmp, file, config)
    }

    fn reply(original: &str, fixed: &str) -> String {
        serde_json::json!({
            "failure_type": "LOCATOR_DRIFT",
            "failure_summary": "Checkout button class was removed",
            "hypothesis": "Use the checkout test id instead of the CSS class",
            "confidence_score": "0.85",
            "reasoning_steps": ["locator resolved to 0 elements", "suggestion offers getByTestId"],
            "action_taken": {
                "original_code": original,
                "fixed_code": fixed,
                "description": "Switch to test id locator"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_heals_file_end_to_end() {
        let (tmp, file, config) = setup();
        let artifacts = config.artifacts_dir.clone();
        // 回复包在 Markdown 代码块里
        let llm = Arc::new(MockLlmClient::with_responses([format!(
            "Here is the fix:\n```json\n{}\n```",
            reply(
                "await page.locator('.btn-checkout').click();",
                "await page.getByTestId('checkout').click();"
            )
        )]));
        let runner = Arc::new(ContentRunner {
            good: "getByTestId('checkout')",
            runs: AtomicUsize::new(0),
        });

        let healing_loop = HealingLoop::new(llm.clone(), runner.clone(), config.clone())
            .with_path_guard(PathGuard::with_base(tmp.path(), &config.allowed_dirs));
        let report = healing_loop.attempt_healing(file.to_str().unwrap()).await;

        assert!(report.outcome.is_success());
        assert!(report.outcome.message().starts_with("SUCCESS: Test healed!"));
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);

        let healed = std::fs::read_to_string(&file).unwrap();
        assert!(healed.contains("    await page.getByTestId('checkout').click();\n"));
        assert!(!healed.contains(".btn-checkout"));
        assert!(healed.ends_with("});\n"));

        // 日志中的 ANSI 序列在送入推理服务前已清理
        let user = llm.user_prompt(0).unwrap();
        assert!(!user.contains('\u{1b}'));
        assert!(user.contains("Did you mean getByTestId"));

        let latest = AuditRecorder::new(&artifacts).latest().unwrap();
        let decision = latest.decision.unwrap();
        assert_eq!(decision.failure_type, FailureType::LocatorDrift);
        assert!((decision.confidence_score - 0.85).abs() < 1e-9);
        assert!(decision.verification_passed);
        let timeline = latest.timeline.unwrap();
        assert_eq!(timeline.session_id(), report.timeline.session_id());
        assert_eq!(timeline.last().unwrap().step_name, "Verification");

        let reports = std::fs::read_dir(&artifacts)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".md"))
            .count();
        assert_eq!(reports, 1);
    }

    #[tokio::test]
    async fn test_exhausts_budget_when_reasoner_has_no_fix() {
        let (tmp, file, config) = setup();
        let llm = Arc::new(MockLlmClient::new());
        let runner = Arc::new(ContentRunner {
            good: "never-present",
            runs: AtomicUsize::new(0),
        });

        let healing_loop = HealingLoop::new(llm.clone(), runner.clone(), config.clone())
            .with_path_guard(PathGuard::with_base(tmp.path(), &config.allowed_dirs));
        let report = healing_loop.attempt_healing(file.to_str().unwrap()).await;

        assert_eq!(report.outcome, HealingOutcome::Failed { attempts: 2 });
        assert_eq!(llm.call_count(), 2);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), BROKEN);
        assert!(report
            .decisions
            .iter()
            .all(|d| d.action_taken.original_code.is_empty()));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (tmp, _file, config) = setup();
        let runner = Arc::new(ContentRunner {
            good: "x",
            runs: AtomicUsize::new(0),
        });
        let healing_loop = HealingLoop::new(Arc::new(MockLlmClient::new()), runner.clone(), config.clone())
            .with_path_guard(PathGuard::with_base(tmp.path(), &config.allowed_dirs));

        let report = healing_loop
            .attempt_healing("tests/generated/../../../etc/passwd")
            .await;
        assert!(matches!(report.outcome, HealingOutcome::InvalidInput { .. }));
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
        assert_eq!(report.timeline.step_names(), vec!["Start", "Error"]);
    }
}
