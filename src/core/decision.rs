//! 挂起与决策：Suspension 是返回给调用方的待审批载荷，Decision 是人工给出的处理结果
//!
//! Decision 可以直接以类型化的值传入，也可以从 JSON 解析（parse），
//! JSON 入口兼容旧协议：accept / response 别名、edit 的 edited_action / 嵌套 args 写法、reject 附带理由。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::memory::{ActionRequest, ResultStatus};
use crate::tools::{ActionPolicy, DecisionKind};

/// 人工决策
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// 按原参数执行
    Approve,
    /// 用替换参数执行
    Edit { args: Map<String, Value> },
    /// 不执行
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// 不执行，message 原样作为动作结果
    Respond { message: String },
}

impl Decision {
    pub fn approve() -> Self {
        Decision::Approve
    }

    pub fn reject() -> Self {
        Decision::Reject { message: None }
    }

    pub fn reject_with(message: impl Into<String>) -> Self {
        Decision::Reject {
            message: Some(message.into()),
        }
    }

    pub fn respond(message: impl Into<String>) -> Self {
        Decision::Respond {
            message: message.into(),
        }
    }

    /// 以 JSON 对象构造 edit；非对象按空对象处理（随后会在参数校验时被拒绝）
    pub fn edit(args: Value) -> Self {
        Decision::Edit {
            args: match args {
                Value::Object(m) => m,
                _ => Map::new(),
            },
        }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Edit { .. } => DecisionKind::Edit,
            Decision::Reject { .. } => DecisionKind::Reject,
            Decision::Respond { .. } => DecisionKind::Respond,
        }
    }

    /// 解析外部传入的 JSON 决策；action 为对应的待审批动作名，用于报错与 edited_action 校验
    pub fn parse(value: &Value, action: &str) -> Result<Self, AgentError> {
        let type_name = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        let kind: DecisionKind = type_name.parse().map_err(|other: String| {
            AgentError::UnsupportedDecision {
                action: action.to_string(),
                decision: other,
            }
        })?;
        let invalid = |reason: &str| AgentError::ArgumentValidation {
            action: action.to_string(),
            reason: reason.to_string(),
        };
        match kind {
            DecisionKind::Approve => Ok(Decision::Approve),
            DecisionKind::Edit => {
                let args = if let Some(edited) = value.get("edited_action") {
                    let name = edited.get("name").and_then(|n| n.as_str()).unwrap_or(action);
                    if name != action {
                        return Err(invalid(&format!(
                            "edited_action.name '{name}' does not match pending action"
                        )));
                    }
                    edited.get("args")
                } else {
                    value.get("args").map(|a| match a.get("args") {
                        Some(inner) if inner.is_object() && a.as_object().map(|o| o.len()) == Some(1) => inner,
                        _ => a,
                    })
                };
                match args {
                    Some(Value::Object(m)) => Ok(Decision::Edit { args: m.clone() }),
                    _ => Err(invalid("edit decision requires an argument object")),
                }
            }
            DecisionKind::Reject => Ok(Decision::Reject {
                message: text_payload(value),
            }),
            DecisionKind::Respond => text_payload(value)
                .map(|message| Decision::Respond { message })
                .ok_or_else(|| invalid("respond decision requires a text message")),
        }
    }
}

/// message 或 args 字段中的文本
fn text_payload(value: &Value) -> Option<String> {
    value
        .get("message")
        .or_else(|| value.get("args"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
}

/// 单个待审批请求的审查配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub action_name: String,
    pub allowed_decisions: Vec<DecisionKind>,
}

impl ReviewConfig {
    pub fn from_policy(action_name: &str, policy: &ActionPolicy) -> Self {
        Self {
            action_name: action_name.to_string(),
            allowed_decisions: policy.allowed_decisions.iter().copied().collect(),
        }
    }
}

/// 挂起载荷：一轮内所有需要审查的请求合并为一个 Suspension
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub conversation_id: String,
    pub pending_requests: Vec<ActionRequest>,
    /// 与 pending_requests 一一对应
    pub review_configs: Vec<ReviewConfig>,
    pub description: String,
}

impl Suspension {
    pub fn len(&self) -> usize {
        self.pending_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_requests.is_empty()
    }
}

/// 不执行的原因
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// 拒绝通知
    Rejected(String),
    /// 人工文本
    Responded(String),
}

/// 一个动作的最终结果，对应一条结果记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Executed(String),
    /// 执行失败；以数据形式写回历史
    Failed(String),
    Skipped(SkipReason),
}

impl ActionOutcome {
    /// 结果记录的正文与状态
    pub fn record(&self) -> (String, ResultStatus) {
        match self {
            ActionOutcome::Executed(s) => (s.clone(), ResultStatus::Executed),
            ActionOutcome::Failed(e) => (format!("Error: {e}"), ResultStatus::Failed),
            ActionOutcome::Skipped(SkipReason::Rejected(n)) => (n.clone(), ResultStatus::Rejected),
            ActionOutcome::Skipped(SkipReason::Responded(t)) => (t.clone(), ResultStatus::Responded),
        }
    }
}
