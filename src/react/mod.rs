//! 认知层：推理引擎抽象、基于 LLM 的 Planner、过程事件

pub mod engine;
pub mod events;
pub mod planner;

pub use engine::{ActionDescriptor, ActionRequest, EngineCall, Generation, ReasoningEngine, ScriptedEngine};
pub use events::LoopEvent;
pub use planner::{parse_llm_output, Planner, ToolCall};
