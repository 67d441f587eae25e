//! 动作注册表
//!
//! 所有动作实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! 每个动作同时登记一份 ActionPolicy，Orchestrator 通过 policy_for 决定是否挂起等待人工审批。
//! 注册只在启动时进行，运行期不可变。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ActionPolicy;

/// 动作 trait：名称、描述（供 LLM 理解）、参数 schema、参数校验、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 动作名称（ActionRequest.name）
    fn name(&self) -> &str;

    /// 动作描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 校验参数形状（edit 决策的替换参数会先经过这里）
    fn validate_args(&self, args: &Value) -> Result<(), String> {
        validate_against_schema(&self.parameters_schema(), args)
    }

    /// 执行动作
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 供推理引擎使用的动作描述
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub requires_review: bool,
}

/// 动作注册表：name -> Arc<dyn Tool> 与 name -> ActionPolicy
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    policies: HashMap<String, ActionPolicy>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册无需审查的动作
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_with_policy(tool, ActionPolicy::auto());
    }

    /// 注册动作并指定审批策略
    pub fn register_with_policy(&mut self, tool: impl Tool + 'static, policy: ActionPolicy) {
        let name = tool.name().to_string();
        self.tools.insert(name.clone(), Arc::new(tool));
        self.policies.insert(name, policy);
    }

    /// 覆盖某个动作的策略（配置文件 [[review.policies]]）；动作可以尚未注册
    pub fn set_policy(&mut self, name: impl Into<String>, policy: ActionPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// 查询审批策略。未登记的动作返回 requires_review=false：
    /// 漏注册会让该动作在无人审查的情况下执行，因此这里记一条 warn。
    pub fn policy_for(&self, name: &str) -> ActionPolicy {
        match self.policies.get(name) {
            Some(p) => p.clone(),
            None => {
                tracing::warn!(action = %name, "unknown action, no review policy registered; executing without review");
                ActionPolicy::auto()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown action: {name}"))?;
        tool.execute(args).await
    }

    /// 按名称排序的动作名列表
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 全部动作描述（按名称排序，保证 prompt 稳定）
    pub fn descriptors(&self) -> Vec<ActionDescriptor> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| {
                let tool = self.tools.get(&name)?;
                Some(ActionDescriptor {
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                    requires_review: self
                        .policies
                        .get(&name)
                        .map(|p| p.requires_review)
                        .unwrap_or(false),
                    name,
                })
            })
            .collect()
    }
}

/// 按动作的参数 JSON Schema 校验；多条错误合并为一条
pub fn validate_against_schema(schema: &Value, args: &Value) -> Result<(), String> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| format!("invalid parameter schema: {e}"))?;
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Tool for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "city": { "type": "string" }, "nights": { "type": ["integer", "null"] } },
                "required": ["city"],
                "additionalProperties": false
            })
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_unknown_action_fails_open() {
        let registry = ToolRegistry::new();
        for name in ["book_hotel", "", "rm -rf", "未知动作"] {
            let p = registry.policy_for(name);
            assert!(!p.requires_review, "{name} should not require review");
        }
    }

    #[test]
    fn test_registered_policy_is_returned() {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(Noop, ActionPolicy::review());
        assert!(registry.policy_for("noop").requires_review);
        registry.set_policy("noop", ActionPolicy::auto());
        assert!(!registry.policy_for("noop").requires_review);
    }

    #[test]
    fn test_descriptors_sorted_with_review_flag() {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(Noop, ActionPolicy::review());
        let d = registry.descriptors();
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].name, "noop");
        assert!(d[0].requires_review);
    }

    #[test]
    fn test_schema_validation() {
        let tool = Noop;
        assert!(tool.validate_args(&json!({"city": "上海"})).is_ok());
        assert!(tool.validate_args(&json!({"city": "上海", "nights": null})).is_ok());
        assert!(tool.validate_args(&json!({"nights": 2})).unwrap_err().contains("city"));
        assert!(tool.validate_args(&json!({"city": 3})).unwrap_err().contains("string"));
        assert!(tool.validate_args(&json!({"city": "x", "extra": 1})).unwrap_err().contains("extra"));
        assert!(tool.validate_args(&json!("city")).is_err());
    }

    #[test]
    fn test_invalid_schema_is_reported() {
        let err = validate_against_schema(&json!({"type": 12}), &json!({})).unwrap_err();
        assert!(err.starts_with("invalid parameter schema"));
    }

    #[tokio::test]
    async fn test_execute_unknown() {
        let registry = ToolRegistry::new();
        let err = registry.execute("ghost", json!({})).await.unwrap_err();
        assert!(err.contains("ghost"));
    }
}
