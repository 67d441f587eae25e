//! 动作层：动作 trait 与注册表、审批策略、执行器（超时 + 审计）、内置订票动作、外部程序动作

pub mod booking;
pub mod executor;
pub mod plugin;
pub mod policy;
pub mod registry;
pub mod schema;

pub use booking::{BookHotelTool, BookTrainTicketTool, QueryTrainTicketsTool};
pub use executor::ToolExecutor;
pub use plugin::PluginTool;
pub use policy::{ActionPolicy, DecisionKind};
pub use registry::{validate_against_schema, ActionDescriptor, Tool, ToolRegistry};
pub use schema::action_call_schema_json;
