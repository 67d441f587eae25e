//! 循环过程事件：用于前端展示思考、动作请求、结果、挂起与恢复

use serde::Serialize;

use crate::memory::ResultStatus;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 第 step 次推理调用开始
    Thinking { step: usize, max_steps: usize },
    /// 推理引擎请求了一个动作
    ActionRequested {
        name: String,
        call_id: String,
        args: serde_json::Value,
        requires_review: bool,
    },
    /// 动作结果（预览，避免过长）
    ActionResult {
        name: String,
        call_id: String,
        status: ResultStatus,
        preview: String,
    },
    /// 会话挂起，等待人工决策
    Suspended { pending: usize, description: String },
    /// 收到决策，继续运行
    Resumed { decisions: usize },
    /// 最终回复的一小段
    MessageChunk { text: String },
    MessageDone,
    Error { text: String },
}
