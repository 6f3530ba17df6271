use std::path::PathBuf;

use crate::config::AppConfig;

/// 自愈会话配置：由 AppConfig 构造一次后显式传入循环
#[derive(Debug, Clone)]
pub struct HealingConfig {
    pub max_retries: usize,
    pub attach_screenshot: bool,
    pub results_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub allowed_dirs: Vec<PathBuf>,
    pub log_excerpt_chars: usize,
    pub heuristic_override_threshold: f64,
    pub write_markdown_report: bool,
    pub prompt_path: Option<PathBuf>,
}

impl Default for HealingConfig {
    fn default() -> Self {
        HealingConfig::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for HealingConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_retries: cfg.healing.max_retries,
            attach_screenshot: cfg.healing.attach_screenshot,
            results_dir: cfg.runner.results_dir.clone(),
            artifacts_dir: cfg.healing.artifacts_dir.clone(),
            allowed_dirs: cfg.healing.allowed_dirs.clone(),
            log_excerpt_chars: cfg.healing.log_excerpt_chars,
            heuristic_override_threshold: cfg.healing.heuristic_override_threshold,
            write_markdown_report: cfg.healing.write_markdown_report,
            prompt_path: cfg.healing.prompt_path.clone(),
        }
    }
}

/// 尝试预算：会话内的尝试计数
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    max_attempts: usize,
    used: usize,
}

impl AttemptBudget {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            used: 0,
        }
    }

    pub fn can_continue(&self) -> bool {
        self.used < self.max_attempts
    }

    /// 开始下一次尝试，返回其序号（从 1 开始）
    pub fn begin_attempt(&mut self) -> usize {
        self.used += 1;
        self.used
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}
