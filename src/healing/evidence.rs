//! 证据收集：把一次运行结果整理成 Evidence
//!
//! 日志先去掉 ANSI 转义序列再入库；开启截图附加时，在结果目录下取最近修改的 png。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;

use crate::healing::runner::RunResult;
use crate::healing::types::Evidence;

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static regex")
    })
}

/// 去掉终端颜色等 ANSI 转义序列
pub fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceCollector {
    /// None 表示不附加截图
    screenshot_dir: Option<PathBuf>,
}

impl EvidenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screenshots(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            screenshot_dir: Some(results_dir.into()),
        }
    }

    pub fn collect(&self, result: &RunResult) -> Evidence {
        let log = strip_ansi(&result.log_text());
        let mut evidence = Evidence::from_log(log);
        if let Some(dir) = &self.screenshot_dir {
            if let Some(shot) = latest_screenshot(dir) {
                tracing::debug!(screenshot = %shot.display(), "attaching screenshot");
                evidence = evidence.with_screenshot(shot);
            }
        }
        evidence
    }
}

/// 目录下（递归）最近修改的 png；目录不存在或无截图时为 None
pub fn latest_screenshot(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    let pattern = dir.join("**").join("*.png");
    let entries = glob::glob(&pattern.to_string_lossy()).ok()?;

    entries
        .filter_map(Result::ok)
        .map(|path| {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}
