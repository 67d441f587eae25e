//! 会话状态：检查点里保存的就是这个结构
//!
//! 阶段只有三种：Running（推理/执行中）、AwaitingReview（有挂起）、Terminated（本轮已给出最终回复）。
//! 一次调用内部会多次提交检查点，因此保存下来的 Running 表示上一次调用在中途失败，下一次调用从这里接着推进。

use serde::{Deserialize, Serialize};

use crate::core::{Decision, Suspension};
use crate::memory::{ActionRequest, ConversationLog};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Running,
    AwaitingReview,
    /// 新会话也视为 Terminated：等待下一条用户消息
    #[default]
    Terminated,
}

/// 单个会话的完整可恢复状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub log: ConversationLog,
    pub phase: LoopPhase,
    /// phase == AwaitingReview 时必有值
    #[serde(default)]
    pub pending: Option<Suspension>,
    /// 已消费挂起、尚未写回结果的决策；保存下来说明落实过程中断，结果未知
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<InFlight>,
}

/// 正在落实的一批决策（与 requests 按位置对应）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InFlight {
    pub requests: Vec<ActionRequest>,
    pub decisions: Vec<Decision>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: None,
            log: ConversationLog::new(),
            phase: LoopPhase::Terminated,
            pending: None,
            in_flight: None,
        }
    }

    pub fn is_awaiting_review(&self) -> bool {
        self.phase == LoopPhase::AwaitingReview && self.pending.is_some()
    }

    pub fn suspend(&mut self, suspension: Suspension) {
        self.phase = LoopPhase::AwaitingReview;
        self.pending = Some(suspension);
    }

    /// 取出挂起并回到 Running
    pub fn take_pending(&mut self) -> Option<Suspension> {
        let pending = self.pending.take();
        if pending.is_some() {
            self.phase = LoopPhase::Running;
        }
        pending
    }

    /// 消费挂起并登记即将落实的决策
    pub fn begin_resolution(&mut self, decisions: Vec<Decision>) -> Option<&InFlight> {
        let suspension = self.take_pending()?;
        self.in_flight = Some(InFlight {
            requests: suspension.pending_requests,
            decisions,
        });
        self.in_flight.as_ref()
    }

    /// 上一次调用在推进途中失败：没有挂起但仍处于 Running
    pub fn is_interrupted(&self) -> bool {
        self.phase == LoopPhase::Running && self.pending.is_none()
    }

    pub fn terminate(&mut self) {
        self.phase = LoopPhase::Terminated;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut state = ConversationState::new("t1");
        assert_eq!(state.phase, LoopPhase::Terminated);
        assert!(state.take_pending().is_none());

        state.suspend(Suspension {
            conversation_id: "t1".into(),
            pending_requests: vec![],
            review_configs: vec![],
            description: String::new(),
        });
        assert!(state.is_awaiting_review());
        assert!(state.take_pending().is_some());
        assert_eq!(state.phase, LoopPhase::Running);
        state.terminate();
        assert_eq!(state.phase, LoopPhase::Terminated);
    }

    #[test]
    fn test_begin_resolution_consumes_pending() {
        let mut state = ConversationState::new("t1");
        assert!(state.begin_resolution(vec![Decision::Approve]).is_none());

        let request = ActionRequest::from_value("book_hotel", serde_json::json!({"hotel_name": "如家"}), "c1");
        state.suspend(Suspension {
            conversation_id: "t1".into(),
            pending_requests: vec![request.clone()],
            review_configs: vec![],
            description: String::new(),
        });
        let in_flight = state.begin_resolution(vec![Decision::Approve]).cloned().unwrap();
        assert_eq!(in_flight.requests, vec![request]);
        assert!(state.pending.is_none());
        assert!(state.is_interrupted());

        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.in_flight, Some(in_flight));
    }

    #[test]
    fn test_state_serde() {
        let mut state = ConversationState::new("t1");
        state.log.push_user("hi");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"phase\":\"terminated\""));
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
