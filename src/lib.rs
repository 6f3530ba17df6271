//! Healer - 端到端 UI 测试自愈引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与路径白名单校验
//! - **healing**: 分类、取证、诊断、修补、审计与重试循环
//! - **llm**: 推理服务客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod healing;
pub mod llm;
pub mod observability;

pub use core::{HealError, PathGuard};
pub use healing::{HealingConfig, HealingLoop, HealingOutcome, HealingReport};
