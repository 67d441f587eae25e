//! Ticket Assistant - 带人工审批（human-in-the-loop）的订票智能体
//!
//! 模块划分：
//! - **agent**: 从配置装配 Orchestrator（LLM、动作注册表、存储）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 主控循环、挂起与决策、恢复协议、会话监管、错误与恢复建议
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话日志、历史窗口、检查点持久化、长期记忆
//! - **observability**: 日志初始化
//! - **react**: 推理引擎抽象、Planner、过程事件
//! - **tools**: 动作注册表、审批策略、执行器、订票动作、外部程序动作

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{Decision, Input, Orchestrator, RunOutcome, Suspension};
