//! 动作执行器：注册表之上的调用面
//!
//! Orchestrator 与恢复流程只通过这里接触动作：查询审批策略、校验 edit 的替换参数、执行 ActionRequest。
//! 执行施加统一超时，动作的 Err 与超时都折算为 ActionOutcome::Failed（写入对话记录，不中断循环），
//! 每次执行输出一行 JSON 审计日志（call_id、结果、耗时、参数预览）。
//! 执行一旦开始就跑到结束，不支持中途取消。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{ActionOutcome, AgentError};
use crate::memory::ActionRequest;
use crate::tools::{ActionPolicy, ToolRegistry};

const ARGS_PREVIEW_CHARS: usize = 200;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 以请求自带的参数执行
    pub async fn run(&self, request: &ActionRequest) -> ActionOutcome {
        self.run_with(request, request.arguments_value()).await
    }

    /// 以给定参数执行（edit 决策）；失败与超时记为 Failed
    pub async fn run_with(&self, request: &ActionRequest, args: Value) -> ActionOutcome {
        match self.execute(&request.call_id, &request.name, args).await {
            Ok(content) => ActionOutcome::Executed(content),
            Err(AgentError::ToolExecutionFailed(e)) => ActionOutcome::Failed(e),
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }

    async fn execute(&self, call_id: &str, name: &str, args: Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "executed",
            Ok(Err(_)) => "failed",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": name,
            "call_id": call_id,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "action");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(name.to_string())),
        }
    }

    /// 校验 edit 决策的替换参数。未登记的动作没有参数格式可校验，执行时会以 Unknown action 失败
    pub fn validate_edit(&self, name: &str, args: &Value) -> Result<(), AgentError> {
        match self.registry.get(name) {
            Some(tool) => tool
                .validate_args(args)
                .map_err(|reason| AgentError::ArgumentValidation {
                    action: name.to_string(),
                    reason,
                }),
            None => Ok(()),
        }
    }

    pub fn policy_for(&self, name: &str) -> ActionPolicy {
        self.registry.policy_for(name)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ResultStatus;
    use crate::tools::{BookHotelTool, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok("late".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("backend unavailable".to_string())
        }
    }

    fn request(name: &str) -> ActionRequest {
        ActionRequest::from_value(name, json!({}), "call_1")
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_outcome() {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        let executor = ToolExecutor::new(registry, 1);
        let (content, status) = executor.run(&request("slow")).await.record();
        assert_eq!(status, ResultStatus::Failed);
        assert_eq!(content, "Error: Tool timeout: slow");
    }

    #[tokio::test]
    async fn test_failure_keeps_tool_message() {
        let mut registry = ToolRegistry::new();
        registry.register(Failing);
        let executor = ToolExecutor::new(registry, 5);
        let out = executor.run(&request("failing")).await;
        assert_eq!(out, ActionOutcome::Failed("backend unavailable".to_string()));
    }

    #[tokio::test]
    async fn test_run_with_replaces_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(BookHotelTool);
        let executor = ToolExecutor::new(registry, 5);
        let req = ActionRequest::from_value("book_hotel", json!({"hotel_name": "如家"}), "c1");
        let out = executor.run_with(&req, json!({"hotel_name": "七天酒店"})).await;
        assert!(matches!(out, ActionOutcome::Executed(ref s) if s.contains("七天酒店")));
    }

    #[test]
    fn test_validate_edit() {
        let mut registry = ToolRegistry::new();
        registry.register(BookHotelTool);
        let executor = ToolExecutor::new(registry, 5);
        assert!(executor.validate_edit("book_hotel", &json!({"hotel_name": "如家"})).is_ok());
        let err = executor.validate_edit("book_hotel", &json!({"hotel": "如家"})).unwrap_err();
        assert!(matches!(err, AgentError::ArgumentValidation { ref action, .. } if action == "book_hotel"));
        assert!(executor.validate_edit("send_email", &json!("anything")).is_ok());
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        let p = args_preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), ARGS_PREVIEW_CHARS + 3);
    }
}
