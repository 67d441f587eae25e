//! 对话日志：按序追加的 ConversationTurn（用户消息 / 助手消息 / 动作调用记录 / 动作结果记录）
//!
//! 不变量：动作结果记录总在对应的调用记录之后，且每个调用最多一条结果。
//! 挂起期间调用记录已写入、结果记录缺失，恢复后补上。
//! Message / Role 是发送给 LLM 的扁平视图，由 to_messages 渲染。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条 LLM 消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 推理引擎发出的动作请求；发出后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
    /// 本轮内唯一
    pub call_id: String,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>, call_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            call_id: call_id.into(),
        }
    }

    /// 以 JSON 对象构造；非对象参数按空对象处理
    pub fn from_value(name: impl Into<String>, arguments: Value, call_id: impl Into<String>) -> Self {
        let arguments = match arguments {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Self::new(name, arguments, call_id)
    }

    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

/// 动作结果的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Executed,
    Failed,
    Rejected,
    Responded,
}

/// 对话中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationTurn {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    ActionInvocation {
        request: ActionRequest,
    },
    ActionResult {
        call_id: String,
        name: String,
        content: String,
        status: ResultStatus,
    },
}

impl ConversationTurn {
    pub fn is_user(&self) -> bool {
        matches!(self, ConversationTurn::User { .. })
    }
}

/// 对话日志：只追加
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::User {
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::Assistant {
            content: content.into(),
        });
    }

    pub fn push_invocation(&mut self, request: ActionRequest) {
        self.turns.push(ConversationTurn::ActionInvocation { request });
    }

    /// 追加结果记录；对应调用记录不存在或已有结果时拒绝
    pub fn push_result(
        &mut self,
        call_id: &str,
        name: &str,
        content: impl Into<String>,
        status: ResultStatus,
    ) -> Result<(), String> {
        if !self.pending_call_ids().iter().any(|id| id == call_id) {
            return Err(format!("no open action invocation with call_id '{call_id}'"));
        }
        self.turns.push(ConversationTurn::ActionResult {
            call_id: call_id.to_string(),
            name: name.to_string(),
            content: content.into(),
            status,
        });
        Ok(())
    }

    /// 已有调用记录但尚无结果记录的 call_id（按出现顺序）
    pub fn pending_call_ids(&self) -> Vec<String> {
        let mut open: Vec<String> = Vec::new();
        for turn in &self.turns {
            match turn {
                ConversationTurn::ActionInvocation { request } => open.push(request.call_id.clone()),
                ConversationTurn::ActionResult { call_id, .. } => open.retain(|id| id != call_id),
                _ => {}
            }
        }
        open
    }

    /// 校验每条结果记录都在其调用记录之后，且同一调用只有一条结果
    pub fn is_well_ordered(&self) -> bool {
        let mut open: Vec<&str> = Vec::new();
        for turn in &self.turns {
            match turn {
                ConversationTurn::ActionInvocation { request } => open.push(&request.call_id),
                ConversationTurn::ActionResult { call_id, .. } => {
                    let Some(pos) = open.iter().position(|id| *id == call_id) else {
                        return false;
                    };
                    open.remove(pos);
                }
                _ => {}
            }
        }
        true
    }

    /// 最近一条用户消息
    pub fn last_user(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            ConversationTurn::User { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// 最近一条助手消息
    pub fn last_assistant(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            ConversationTurn::Assistant { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// 将记录渲染为 LLM 消息：调用记录作为 assistant，结果记录作为 Observation（user）
pub fn to_messages(turns: &[ConversationTurn]) -> Vec<Message> {
    turns
        .iter()
        .map(|t| match t {
            ConversationTurn::User { content } => Message::user(content.clone()),
            ConversationTurn::Assistant { content } => Message::assistant(content.clone()),
            ConversationTurn::ActionInvocation { request } => Message::assistant(format!(
                "Action call [{}]: {} {}",
                request.call_id,
                request.name,
                request.arguments_value()
            )),
            ConversationTurn::ActionResult {
                call_id,
                name,
                content,
                ..
            } => Message::user(format!("Observation from {} [{}]: {}", name, call_id, content)),
        })
        .collect()
}
