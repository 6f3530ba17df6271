//! 补丁应用：在当前源码中定位 action.original_code 并替换为 action.fixed_code
//!
//! 先做精确子串匹配（只替换第一处）；失败时按行去除首尾空白后做滑动窗口匹配，
//! 命中后用窗口首行的缩进重新缩进替换块。找不到时原样返回，调用方通过相等比较识别空操作。

use crate::healing::types::HealingAction;

/// 定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    /// 在第 line 行（从 0 开始）处按归一化行匹配
    Normalized { line: usize },
    NotFound,
    /// 动作为空，未尝试匹配
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub code: String,
    pub strategy: MatchStrategy,
}

impl PatchResult {
    pub fn applied(&self) -> bool {
        matches!(
            self.strategy,
            MatchStrategy::Exact | MatchStrategy::Normalized { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchApplier;

impl PatchApplier {
    pub fn new() -> Self {
        Self
    }

    /// 返回更新后的源码；无法应用时返回输入的副本
    pub fn apply(&self, current_code: &str, action: &HealingAction) -> String {
        self.apply_detailed(current_code, action).code
    }

    pub fn apply_detailed(&self, current_code: &str, action: &HealingAction) -> PatchResult {
        if action.is_noop() {
            return PatchResult {
                code: current_code.to_string(),
                strategy: MatchStrategy::Skipped,
            };
        }

        let target = action.original_code.as_str();
        let replacement = action.fixed_code.as_str();

        if current_code.contains(target) {
            return PatchResult {
                code: current_code.replacen(target, replacement, 1),
                strategy: MatchStrategy::Exact,
            };
        }

        if let Some((code, line)) = replace_normalized(current_code, target, replacement) {
            tracing::info!(line = line + 1, "applied fix with whitespace-normalized match");
            return PatchResult {
                code,
                strategy: MatchStrategy::Normalized { line },
            };
        }

        tracing::warn!(
            "Target code not found in file (even after normalization).\nTarget:\n{}",
            target
        );
        PatchResult {
            code: current_code.to_string(),
            strategy: MatchStrategy::NotFound,
        }
    }
}

/// 目标块的「有效行」：去首尾空白，丢弃空行
fn significant_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// 第一个逐行（去空白后）相等的窗口起点
fn find_window(code_lines: &[&str], target_lines: &[&str]) -> Option<usize> {
    if target_lines.is_empty() || target_lines.len() > code_lines.len() {
        return None;
    }
    code_lines.windows(target_lines.len()).position(|window| {
        window
            .iter()
            .zip(target_lines)
            .all(|(code, target)| code.trim() == *target)
    })
}

fn replace_normalized(current_code: &str, target: &str, replacement: &str) -> Option<(String, usize)> {
    let target_lines = significant_lines(target);
    let code_lines: Vec<&str> = current_code.lines().collect();
    let start = find_window(&code_lines, &target_lines)?;

    let indent = leading_whitespace(code_lines[start]);
    let reindented = replacement.lines().map(|line| {
        let content = line.trim_start();
        if content.is_empty() {
            String::new()
        } else {
            format!("{}{}", indent, content)
        }
    });

    let mut lines: Vec<String> = Vec::with_capacity(code_lines.len());
    lines.extend(code_lines[..start].iter().map(|l| l.to_string()));
    lines.extend(reindented);
    lines.extend(
        code_lines[start + target_lines.len()..]
            .iter()
            .map(|l| l.to_string()),
    );

    let eol = if current_code.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = lines.join(eol);
    if current_code.ends_with('\n') {
        out.push_str(eol);
    }
    Some((out, start))
}
