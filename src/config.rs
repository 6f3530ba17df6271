//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HEALER__*` 覆盖（双下划线表示嵌套，如 `HEALER__HEALING__MAX_RETRIES=3`）。
//! 配置只在入口处加载一次，之后以值的形式传入各组件；核心逻辑不读取环境变量。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub healing: HealingSection,
}

/// [llm] 段：推理服务后端、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: Option<String>,
    /// 未设置时回落到 OPENAI_API_KEY / DEEPSEEK_API_KEY（仅在入口处读取）
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "local-model".to_string()
}

fn default_base_url() -> Option<String> {
    Some("http://localhost:1234/v1".to_string())
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [runner] 段：外部测试执行器命令行与超时
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_program")]
    pub program: String,
    /// 固定参数；测试文件路径追加在最后
    #[serde(default = "default_runner_args")]
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_runner_timeout_secs")]
    pub timeout_secs: u64,
    /// 执行器输出截图的目录
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_program() -> String {
    "npx".to_string()
}

fn default_runner_args() -> Vec<String> {
    vec!["playwright".into(), "test".into()]
}

fn default_runner_timeout_secs() -> u64 {
    60
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("test-results")
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_runner_args(),
            working_dir: None,
            timeout_secs: default_runner_timeout_secs(),
            results_dir: default_results_dir(),
        }
    }
}

/// [healing] 段：重试预算、证据、审计产物目录与路径白名单
#[derive(Debug, Clone, Deserialize)]
pub struct HealingSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_true")]
    pub attach_screenshot: bool,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    #[serde(default = "default_allowed_dirs")]
    pub allowed_dirs: Vec<PathBuf>,
    /// 送入推理服务的错误日志最大字符数
    #[serde(default = "default_log_excerpt_chars")]
    pub log_excerpt_chars: usize,
    /// 启发式置信度高于此值且推理服务返回 UNKNOWN 时，采用启发式分类
    #[serde(default = "default_override_threshold")]
    pub heuristic_override_threshold: f64,
    #[serde(default)]
    pub write_markdown_report: bool,
    /// 自定义 system prompt 模板（含 {failure_type} {confidence} {reason} 占位符）
    #[serde(default = "default_prompt_path")]
    pub prompt_path: Option<PathBuf>,
}

fn default_max_retries() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("tests/artifacts")
}

fn default_allowed_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("tests/generated")]
}

fn default_log_excerpt_chars() -> usize {
    2000
}

fn default_override_threshold() -> f64 {
    0.8
}

fn default_prompt_path() -> Option<PathBuf> {
    Some(PathBuf::from("config/prompts/healer.md"))
}

impl Default for HealingSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attach_screenshot: true,
            artifacts_dir: default_artifacts_dir(),
            allowed_dirs: default_allowed_dirs(),
            log_excerpt_chars: default_log_excerpt_chars(),
            heuristic_override_threshold: default_override_threshold(),
            write_markdown_report: false,
            prompt_path: default_prompt_path(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HEALER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HEALER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HEALER")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("runner.args")
            .with_list_parse_key("healing.allowed_dirs")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.healing.max_retries, 1);
        assert_eq!(cfg.healing.log_excerpt_chars, 2000);
        assert_eq!(cfg.runner.timeout_secs, 60);
        assert_eq!(cfg.runner.args, vec!["playwright", "test"]);
        assert_eq!(cfg.healing.allowed_dirs, vec![PathBuf::from("tests/generated")]);
        assert!((cfg.healing.heuristic_override_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healer.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[llm]
provider = "mock"

[runner]
program = "node"
args = ["run-test.js"]
timeout_secs = 5

[healing]
max_retries = 3
artifacts_dir = "out/artifacts"
"#
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.runner.program, "node");
        assert_eq!(cfg.runner.args, vec!["run-test.js"]);
        assert_eq!(cfg.runner.timeout_secs, 5);
        assert_eq!(cfg.healing.max_retries, 3);
        assert_eq!(cfg.healing.artifacts_dir, PathBuf::from("out/artifacts"));
        // 未给出的键保持默认
        assert!(cfg.healing.attach_screenshot);
    }
}
