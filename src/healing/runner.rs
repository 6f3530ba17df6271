//! 外部测试执行器
//!
//! 以子进程方式运行单个测试文件，退出码 0 视为通过。超时、找不到可执行文件、启动失败都被表示为
//! 失败的 RunResult，而不是错误，这样它们可以作为证据进入分类流程。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::RunnerSection;

/// 一次测试运行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        after_secs: u64,
    },
    ExecutableMissing {
        program: String,
    },
    SpawnFailed {
        reason: String,
    },
}

impl RunResult {
    pub fn passed(&self) -> bool {
        matches!(self, RunResult::Completed { exit_code: 0, .. })
    }

    /// 非正常结束时为 None
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunResult::Completed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// 用于诊断的日志：stderr 非空时优先，否则 stdout；非正常结束时合成一段描述
    pub fn log_text(&self) -> String {
        match self {
            RunResult::Completed { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    stdout.clone()
                } else {
                    stderr.clone()
                }
            }
            RunResult::TimedOut { after_secs } => {
                format!("Test execution timed out after {} seconds", after_secs)
            }
            RunResult::ExecutableMissing { program } => {
                format!("Test runner '{}' not found", program)
            }
            RunResult::SpawnFailed { reason } => {
                format!("Failed to launch test runner: {}", reason)
            }
        }
    }

    /// 回归运行的记录：通过时取 stdout，否则取诊断日志
    pub fn verification_log(&self) -> String {
        match self {
            RunResult::Completed {
                exit_code: 0,
                stdout,
                ..
            } => stdout.clone(),
            other => other.log_text(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RunResult::Completed { exit_code, .. } => format!("return code {}", exit_code),
            RunResult::TimedOut { after_secs } => format!("timeout after {}s", after_secs),
            RunResult::ExecutableMissing { program } => format!("runner '{}' missing", program),
            RunResult::SpawnFailed { reason } => format!("spawn failure ({})", reason),
        }
    }
}

/// 测试执行能力：编排器只依赖此 trait，测试中可替换为脚本化实现
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, test_file: &Path) -> RunResult;
}

/// 基于命令行的执行器，默认 `npx playwright test <file>`
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout_secs: u64,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout_secs: 60,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl From<&RunnerSection> for CommandRunner {
    fn from(section: &RunnerSection) -> Self {
        let runner = CommandRunner::new(section.program.clone(), section.args.clone())
            .with_timeout(section.timeout_secs);
        match &section.working_dir {
            Some(dir) => runner.with_working_dir(dir),
            None => runner,
        }
    }
}

#[async_trait]
impl TestRunner for CommandRunner {
    async fn run(&self, test_file: &Path) -> RunResult {
        tracing::info!(program = %self.program, file = %test_file.display(), "running test");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(test_file).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        {
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout_secs, "test run timed out");
                return RunResult::TimedOut {
                    after_secs: self.timeout_secs,
                };
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(program = %self.program, "test runner not found");
                return RunResult::ExecutableMissing {
                    program: self.program.clone(),
                };
            }
            Ok(Err(e)) => {
                return RunResult::SpawnFailed {
                    reason: e.to_string(),
                }
            }
            Ok(Ok(output)) => output,
        };

        let result = RunResult::Completed {
            // 被信号终止时没有退出码
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        tracing::info!(outcome = %result.describe(), "test run finished");
        result
    }
}

/// 按顺序返回预设结果的执行器；脚本用尽后返回一个通用失败
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<RunResult>>,
    invocations: Mutex<Vec<PathBuf>>,
}

impl ScriptedRunner {
    pub fn new(results: impl IntoIterator<Item = RunResult>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn pass(stdout: &str) -> RunResult {
        RunResult::Completed {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(stderr: &str) -> RunResult {
        RunResult::Completed {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn run(&self, test_file: &Path) -> RunResult {
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(test_file.to_path_buf());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| ScriptedRunner::fail("scripted runner exhausted"))
    }
}
