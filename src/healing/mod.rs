//! 自愈引擎：失败分类、证据采集、诊断规划、补丁应用、审计落盘与重试编排
//!
//! 一次会话的流程：运行测试 → 取证 → 启发式分类 + 推理服务诊断 → 修补源文件 → 回归运行，
//! 每次尝试都在 artifacts 目录留下决策与时间线。

pub mod audit;
pub mod classifier;
pub mod engine;
pub mod evidence;
pub mod loop_;
pub mod patcher;
pub mod planner;
pub mod response;
pub mod runner;
pub mod types;

pub use audit::{AuditArtifacts, AuditRecorder, LatestArtifacts};
pub use classifier::{classify, Classification};
pub use engine::{AttemptBudget, HealingConfig};
pub use evidence::EvidenceCollector;
pub use loop_::HealingLoop;
pub use patcher::{MatchStrategy, PatchApplier, PatchResult};
pub use planner::DiagnosisPlanner;
pub use runner::{CommandRunner, RunResult, ScriptedRunner, TestRunner};
pub use types::{
    Evidence, ExecutionTimeline, FailureType, HealingAction, HealingDecision, HealingOutcome,
    HealingReport, Stage, TimelineStep,
};
