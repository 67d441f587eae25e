//! 推理引擎抽象
//!
//! 给定（已窗口化的）对话历史、可用动作描述与用户长期记忆，产出最终文本或一组动作请求。
//! 引擎本身无状态：所有需要跨调用保留的东西都在对话历史里。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;
pub use crate::memory::ActionRequest;
use crate::memory::ConversationTurn;
pub use crate::tools::ActionDescriptor;

/// 一次推理调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// 直接回复用户，本轮结束
    Message(String),
    /// 请求执行动作（可多个，按顺序）
    Actions(Vec<ActionRequest>),
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn generate(
        &self,
        history: &[ConversationTurn],
        actions: &[ActionDescriptor],
        long_term_facts: &str,
    ) -> Result<Generation, AgentError>;
}

/// 单次 generate 调用的输入快照，供测试断言
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub history: Vec<ConversationTurn>,
    pub action_names: Vec<String>,
    pub long_term_facts: String,
}

/// 按脚本依次返回预设结果的引擎；脚本耗尽后回复固定文本
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Generation>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub const EXHAUSTED_REPLY: &'static str = "Done.";

    pub fn new(script: impl IntoIterator<Item = Generation>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加脚本
    pub fn push(&self, generation: Generation) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(generation);
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn generate(
        &self,
        history: &[ConversationTurn],
        actions: &[ActionDescriptor],
        long_term_facts: &str,
    ) -> Result<Generation, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(EngineCall {
                history: history.to_vec(),
                action_names: actions.iter().map(|a| a.name.clone()).collect(),
                long_term_facts: long_term_facts.to_string(),
            });
        }
        let next = self
            .script
            .lock()
            .map_err(|e| AgentError::LlmError(e.to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| Generation::Message(Self::EXHAUSTED_REPLY.to_string())))
    }
}
