//! 路径校验：被修补的测试文件必须位于允许目录之内
//!
//! 与 canonicalize 不同，这里做纯词法归一（处理 `.` / `..`），因此文件不存在时也能给出绝对路径，
//! 由调用方再判断「不存在」这一致命输入错误。

use std::path::{Component, Path, PathBuf};

use crate::core::HealError;

/// 允许目录白名单；相对目录以 base_dir 为基准解析
#[derive(Debug, Clone)]
pub struct PathGuard {
    base_dir: PathBuf,
    allowed_dirs: Vec<PathBuf>,
}

impl PathGuard {
    /// 以当前工作目录为基准
    pub fn new(allowed_dirs: &[PathBuf]) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::with_base(base_dir, allowed_dirs)
    }

    pub fn with_base(base_dir: impl AsRef<Path>, allowed_dirs: &[PathBuf]) -> Self {
        let base_dir = normalize(base_dir.as_ref());
        let allowed_dirs = allowed_dirs
            .iter()
            .map(|d| absolutize(&base_dir, d))
            .collect();
        Self {
            base_dir,
            allowed_dirs,
        }
    }

    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allowed_dirs
    }

    /// 返回归一化后的绝对路径；不在任何允许目录下时返回 PathEscape
    pub fn validate(&self, candidate: &str) -> Result<PathBuf, HealError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(HealError::EmptyPath);
        }

        let resolved = absolutize(&self.base_dir, Path::new(candidate));
        if self
            .allowed_dirs
            .iter()
            .any(|allowed| resolved.starts_with(allowed))
        {
            Ok(resolved)
        } else {
            tracing::warn!(path = %candidate, "rejected path outside allowed directories");
            Err(HealError::PathEscape(format!(
                "{} (allowed: {})",
                candidate,
                self.allowed_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// 词法归一：去掉 `.`，`..` 弹出上一段（不越过根）
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
