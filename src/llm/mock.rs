//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；回复用尽后返回 ApiError。同时记录收到的每一轮消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    received: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
        self
    }

    pub fn with_error(self, error: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error.into()));
        }
        self
    }

    /// 已收到的请求
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| LlmError::ApiError("mock poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(LlmError::ApiError(error)),
            None => Err(LlmError::ApiError("no scripted reply left".to_string())),
        }
    }
}
