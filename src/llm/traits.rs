//! LLM 客户端抽象
//!
//! 诊断规划器只依赖 LlmClient::complete；具体后端（OpenAI 兼容 / DeepSeek / Mock）可替换，测试中注入 Mock。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：一次非流式完成，失败以字符串描述返回
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
