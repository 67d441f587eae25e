//! 核心编排层：错误与恢复、会话状态、挂起与决策、恢复协议、会话监管、主控循环

pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod resume;
pub mod session_supervisor;
pub mod state;

pub use decision::{ActionOutcome, Decision, ReviewConfig, SkipReason, Suspension};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{Input, Orchestrator, RunOutcome, DEFAULT_DESCRIPTION_PREFIX, DEFAULT_MAX_STEPS};
pub use recovery::RecoveryEngine;
pub use resume::{parse_decisions, validate_decisions};
pub use session_supervisor::{SessionGuard, SessionSupervisor};
pub use state::{ConversationState, InFlight, LoopPhase};
