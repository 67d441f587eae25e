//! Agent 错误类型与恢复动作
//!
//! 人工决策边界上的错误（决策数量不符、参数非法、决策类型不支持）在修改任何状态之前被拒绝，挂起保持不变；
//! 动作边界上的错误（执行失败、超时）被写入对话历史作为数据，不作为故障向上抛出。

use thiserror::Error;

use crate::tools::DecisionKind;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 注册表未登记该动作；仅记录日志，按无需审查处理
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Argument validation failed for {action}: {reason}")]
    ArgumentValidation { action: String, reason: String },

    #[error("Unsupported decision '{decision}' for action {action}")]
    UnsupportedDecision { action: String, decision: String },

    #[error("Decision count mismatch: {expected} pending request(s), {got} decision(s) supplied")]
    DecisionCountMismatch { expected: usize, got: usize },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("No pending suspension for conversation {0}")]
    NoPendingSuspension(String),

    #[error("Conversation {0} is awaiting review; supply decisions before sending a new message")]
    ReviewPending(String),

    #[error("Conversation {0} is already being processed")]
    ConversationBusy(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    pub fn unsupported(action: &str, decision: DecisionKind) -> Self {
        AgentError::UnsupportedDecision {
            action: action.to_string(),
            decision: decision.to_string(),
        }
    }
}

/// 恢复引擎给调用方的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 状态未推进，可原样重试同一次调用
    RetrySameCall,
    /// 挂起仍在，修正决策后重新提交
    ResubmitDecisions(String),
    /// 先处理挂起的审批
    ResolveReviewFirst,
    /// 没有可恢复的挂起，发送新的用户消息
    StartNewTurn,
    /// 终止
    Abort,
}
