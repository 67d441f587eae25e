//! 错误恢复引擎
//!
//! 核心循环不在内部重试（LLM 后端的瞬时错误、持久化失败都原样上抛）；
//! RecoveryEngine 把 AgentError 映射为给调用方的建议：原样重试 / 修正决策 / 先审批 / 新一轮 / 终止。

use crate::core::{AgentError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Persistence(_)
            | AgentError::LlmError(_)
            | AgentError::ConversationBusy(_) => RecoveryAction::RetrySameCall,
            AgentError::ArgumentValidation { action, reason } => RecoveryAction::ResubmitDecisions(
                format!("修改后的参数不合法（{action}）：{reason}。请提供符合参数格式的 edit 决策。"),
            ),
            AgentError::UnsupportedDecision { action, decision } => {
                RecoveryAction::ResubmitDecisions(format!(
                    "动作 {action} 不允许决策 '{decision}'，请改用允许的决策类型。"
                ))
            }
            AgentError::DecisionCountMismatch { expected, got } => {
                RecoveryAction::ResubmitDecisions(format!(
                    "需要 {expected} 个决策（与待审批请求一一对应），实际收到 {got} 个。"
                ))
            }
            AgentError::ReviewPending(_) => RecoveryAction::ResolveReviewFirst,
            AgentError::NoPendingSuspension(_) => RecoveryAction::StartNewTurn,
            _ => RecoveryAction::Abort,
        }
    }
}
