//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序吐出预设回复（可包含失败）；脚本用尽后返回一个「UNKNOWN + 空动作」的 JSON，
//! 使自愈循环在没有推理服务时也能安全跑完。收到的每组消息都会被记录，便于断言 Prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

const FALLBACK_RESPONSE: &str = r#"{"failure_type": "UNKNOWN", "failure_summary": "Mock reasoner has no proposal", "hypothesis": "No reasoning service configured", "confidence_score": 0.0, "reasoning_steps": ["Mock LLM returned a placeholder response"], "action_taken": {"original_code": "", "fixed_code": "", "description": "No action"}}"#;

/// Mock 客户端：脚本化回复 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定的成功回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in responses {
            mock.push_response(r);
        }
        mock
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    /// 下一次调用返回错误（模拟网络失败 / 超时）
    pub fn push_failure(&self, error: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error.into()));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 n 次调用中的 system 消息内容
    pub fn system_prompt(&self, call: usize) -> Option<String> {
        self.message_of(call, Role::System)
    }

    /// 第 n 次调用中的 user 消息内容
    pub fn user_prompt(&self, call: usize) -> Option<String> {
        self.message_of(call, Role::User)
    }

    fn message_of(&self, call: usize, role: Role) -> Option<String> {
        let calls = self.calls.lock().ok()?;
        calls
            .get(call)?
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => Ok(FALLBACK_RESPONSE.to_string()),
        }
    }
}
