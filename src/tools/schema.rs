//! 动作调用 JSON Schema 生成（schemars 自动生成）
//!
//! 用于将「合法动作调用」的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 单个动作调用：与 Planner 解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionCallFormat {
    /// 动作名，如 book_hotel、query_train_tickets
    pub tool: String,
    /// 动作参数，依动作不同而不同
    pub args: HashMap<String, serde_json::Value>,
}

/// 一轮内的多个动作调用：`{"actions": [...]}`
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionBatchFormat {
    pub actions: Vec<ActionCallFormat>,
}

/// 返回动作调用的 JSON Schema 字符串，可拼入 system prompt
pub fn action_call_schema_json() -> String {
    let schema = schema_for!(ActionBatchFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
