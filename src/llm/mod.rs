//! LLM 层：推理服务客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

use crate::config::LlmSection;

/// 按 [llm] 配置构造客户端；provider 为 mock 时不需要任何 Key
///
/// api_key 未配置时回落到环境变量（OPENAI_API_KEY / DEEPSEEK_API_KEY），再回落到本地服务常用的占位 Key。
/// 该函数只在入口处调用一次，结果以 `Arc<dyn LlmClient>` 注入诊断规划器。
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    match provider.as_str() {
        "mock" => {
            tracing::warn!("Using Mock LLM, no fixes will be proposed");
            Arc::new(MockLlmClient::new())
        }
        "deepseek" => {
            let api_key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .unwrap_or_else(|| "sk-placeholder".to_string());
            let model = if cfg.model.starts_with("deepseek") {
                cfg.model.as_str()
            } else {
                DEEPSEEK_CHAT
            };
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(
                create_deepseek_client(Some(model), &api_key)
                    .with_temperature(cfg.temperature)
                    .with_request_timeout(cfg.timeouts.request),
            )
        }
        other => {
            if other != "openai" {
                tracing::warn!(provider = %other, "unknown LLM provider, treating as OpenAI-compatible");
            }
            let api_key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .unwrap_or_else(|| "lm-studio".to_string());
            tracing::info!(
                "Using OpenAI-compatible LLM ({}) at {}",
                cfg.model,
                cfg.base_url.as_deref().unwrap_or("default endpoint")
            );
            Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, &api_key)
                    .with_temperature(cfg.temperature)
                    .with_request_timeout(cfg.timeouts.request),
            )
        }
    }
}
