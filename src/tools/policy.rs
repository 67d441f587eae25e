//! 审批策略：每个动作是否需要人工审查、允许哪些决策类型
//!
//! 启动时配置一次，运行期只读。未注册的动作由 ToolRegistry::policy_for 返回默认策略（无需审查）。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 人工决策类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// 按原参数执行
    Approve,
    /// 用替换参数执行
    Edit,
    /// 不执行，写入拒绝通知
    Reject,
    /// 不执行，人工文本作为动作结果
    Respond,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 4] = [
        DecisionKind::Approve,
        DecisionKind::Edit,
        DecisionKind::Reject,
        DecisionKind::Respond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Approve => "approve",
            DecisionKind::Edit => "edit",
            DecisionKind::Reject => "reject",
            DecisionKind::Respond => "respond",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析决策类型名；兼容旧协议的 accept / response 别名
impl FromStr for DecisionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "accept" => Ok(DecisionKind::Approve),
            "edit" => Ok(DecisionKind::Edit),
            "reject" => Ok(DecisionKind::Reject),
            "respond" | "response" => Ok(DecisionKind::Respond),
            other => Err(other.to_string()),
        }
    }
}

/// 单个动作的审批策略
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPolicy {
    pub requires_review: bool,
    pub allowed_decisions: BTreeSet<DecisionKind>,
}

impl ActionPolicy {
    /// 无需审查，直接执行
    pub fn auto() -> Self {
        Self {
            requires_review: false,
            allowed_decisions: BTreeSet::new(),
        }
    }

    /// 需要审查，允许全部四种决策
    pub fn review() -> Self {
        Self {
            requires_review: true,
            allowed_decisions: DecisionKind::ALL.into_iter().collect(),
        }
    }

    /// 需要审查，仅允许指定决策
    pub fn review_with(allowed: impl IntoIterator<Item = DecisionKind>) -> Self {
        Self {
            requires_review: true,
            allowed_decisions: allowed.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self::auto()
    }
}
