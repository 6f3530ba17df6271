//! 自愈引擎错误类型
//!
//! 只有输入错误（路径非法、文件缺失/为空）对会话是致命的；Runner 与 LLM 的失败在各自边界被降级为普通结果，
//! 不会以 HealError 的形式传到编排器之外。

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealError {
    #[error("File path cannot be empty")]
    EmptyPath,

    /// 路径逃逸出允许目录（如 ../../etc/passwd）
    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl HealError {
    /// 输入类错误：会话立即终止，不消耗重试预算
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HealError::EmptyPath
                | HealError::PathEscape(_)
                | HealError::FileNotFound(_)
                | HealError::EmptyFile(_)
        )
    }
}

impl From<config::ConfigError> for HealError {
    fn from(e: config::ConfigError) -> Self {
        HealError::ConfigError(e.to_string())
    }
}
