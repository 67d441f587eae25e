//! 恢复协议：校验人工决策，并把每个决策落实为一个 ActionOutcome
//!
//! validate_decisions 在任何执行之前完成全部校验（数量、允许的决策类型、edit 参数），
//! 任一失败则整体拒绝，挂起保持原样；通过后才按位置逐个 resolve。

use serde_json::Value;

use crate::core::{ActionOutcome, AgentError, Decision, SkipReason, Suspension};
use crate::memory::ActionRequest;
use crate::tools::ToolExecutor;

/// 全部决策的前置校验；不产生任何副作用
pub fn validate_decisions(
    suspension: &Suspension,
    decisions: &[Decision],
    executor: &ToolExecutor,
) -> Result<(), AgentError> {
    if decisions.len() != suspension.pending_requests.len() {
        return Err(AgentError::DecisionCountMismatch {
            expected: suspension.pending_requests.len(),
            got: decisions.len(),
        });
    }

    for ((request, config), decision) in suspension
        .pending_requests
        .iter()
        .zip(&suspension.review_configs)
        .zip(decisions)
    {
        let kind = decision.kind();
        if !config.allowed_decisions.contains(&kind) {
            return Err(AgentError::unsupported(&request.name, kind));
        }
        if let Decision::Edit { args } = decision {
            executor.validate_edit(&request.name, &Value::Object(args.clone()))?;
        }
    }
    Ok(())
}

/// 解析 JSON 形式的决策列表（数量不符时先报 DecisionCountMismatch）
pub fn parse_decisions(
    suspension: &Suspension,
    raw: &[Value],
) -> Result<Vec<Decision>, AgentError> {
    if raw.len() != suspension.pending_requests.len() {
        return Err(AgentError::DecisionCountMismatch {
            expected: suspension.pending_requests.len(),
            got: raw.len(),
        });
    }
    suspension
        .pending_requests
        .iter()
        .zip(raw)
        .map(|(request, value)| Decision::parse(value, &request.name))
        .collect()
}

/// 落实单个决策；动作失败以 Failed 返回，不向上抛出
pub async fn resolve(
    executor: &ToolExecutor,
    request: &ActionRequest,
    decision: &Decision,
) -> ActionOutcome {
    match decision {
        Decision::Approve => executor.run(request).await,
        Decision::Edit { args } => executor.run_with(request, Value::Object(args.clone())).await,
        Decision::Reject { message } => {
            ActionOutcome::Skipped(SkipReason::Rejected(rejection_notice(request, message.as_deref())))
        }
        Decision::Respond { message } => ActionOutcome::Skipped(SkipReason::Responded(message.clone())),
    }
}

/// 上次落实途中中断的决策：approve / edit 不再重跑（可能已经执行过），记为结果未知的失败；
/// reject / respond 没有副作用，照常落实
pub fn settle_interrupted(request: &ActionRequest, decision: &Decision) -> ActionOutcome {
    match decision {
        Decision::Approve | Decision::Edit { .. } => ActionOutcome::Failed(format!(
            "the call to `{}` (id {}) was interrupted before its result was saved; \
             its outcome is unknown and it was not run again.",
            request.name, request.call_id
        )),
        Decision::Reject { message } => {
            ActionOutcome::Skipped(SkipReason::Rejected(rejection_notice(request, message.as_deref())))
        }
        Decision::Respond { message } => ActionOutcome::Skipped(SkipReason::Responded(message.clone())),
    }
}

pub fn rejection_notice(request: &ActionRequest, reason: Option<&str>) -> String {
    let mut notice = format!(
        "User rejected the call to `{}` (id {}); the action was not executed.",
        request.name, request.call_id
    );
    if let Some(r) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        notice.push_str(&format!(" Reason: {r}"));
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReviewConfig;
    use crate::tools::{ActionPolicy, BookHotelTool, DecisionKind, ToolRegistry};
    use serde_json::json;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(
            BookHotelTool,
            ActionPolicy::review_with([DecisionKind::Approve, DecisionKind::Reject, DecisionKind::Edit]),
        );
        ToolExecutor::new(registry, 5)
    }

    fn suspension(executor: &ToolExecutor, n: usize) -> Suspension {
        let requests: Vec<ActionRequest> = (0..n)
            .map(|i| ActionRequest::from_value("book_hotel", json!({"hotel_name": "如家"}), format!("call_{i}")))
            .collect();
        let review_configs = requests
            .iter()
            .map(|r| ReviewConfig::from_policy(&r.name, &executor.policy_for(&r.name)))
            .collect();
        Suspension {
            conversation_id: "t1".into(),
            pending_requests: requests,
            review_configs,
            description: "Tool execution pending approval".into(),
        }
    }

    #[test]
    fn test_count_mismatch() {
        let ex = executor();
        let s = suspension(&ex, 2);
        let err = validate_decisions(&s, &[Decision::Approve], &ex).unwrap_err();
        assert!(matches!(err, AgentError::DecisionCountMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn test_disallowed_decision() {
        let ex = executor();
        let s = suspension(&ex, 1);
        let err = validate_decisions(&s, &[Decision::respond("no")], &ex).unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedDecision { ref decision, .. } if decision == "respond"));
    }

    #[test]
    fn test_invalid_edit_rejected_before_anything_runs() {
        let ex = executor();
        let s = suspension(&ex, 2);
        let decisions = [Decision::Approve, Decision::edit(json!({"hotel": "x"}))];
        let err = validate_decisions(&s, &decisions, &ex).unwrap_err();
        assert!(matches!(err, AgentError::ArgumentValidation { ref action, .. } if action == "book_hotel"));

        let ok = [Decision::Approve, Decision::edit(json!({"hotel_name": "七天酒店"}))];
        assert!(validate_decisions(&s, &ok, &ex).is_ok());
    }

    #[test]
    fn test_parse_decisions_positional() {
        let ex = executor();
        let s = suspension(&ex, 2);
        let parsed = parse_decisions(&s, &[json!({"type": "accept"}), json!({"type": "reject"})]).unwrap();
        assert_eq!(parsed, vec![Decision::Approve, Decision::reject()]);
        assert!(matches!(
            parse_decisions(&s, &[json!({"type": "approve"})]),
            Err(AgentError::DecisionCountMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_each_decision() {
        let ex = executor();
        let req = ActionRequest::from_value("book_hotel", json!({"hotel_name": "如家"}), "call_1");

        let out = resolve(&ex, &req, &Decision::Approve).await;
        assert!(matches!(out, ActionOutcome::Executed(ref s) if s.contains("如家")));

        let out = resolve(&ex, &req, &Decision::edit(json!({"hotel_name": "七天酒店"}))).await;
        assert!(matches!(out, ActionOutcome::Executed(ref s) if s.contains("七天酒店") && !s.contains("如家")));

        let out = resolve(&ex, &req, &Decision::reject_with("太贵")).await;
        match out {
            ActionOutcome::Skipped(SkipReason::Rejected(n)) => {
                assert!(n.contains("book_hotel"));
                assert!(n.contains("call_1"));
                assert!(n.contains("太贵"));
            }
            other => panic!("Expected rejection, got {other:?}"),
        }

        let out = resolve(&ex, &req, &Decision::respond("cancel please")).await;
        assert_eq!(out, ActionOutcome::Skipped(SkipReason::Responded("cancel please".into())));
    }

    #[test]
    fn test_settle_interrupted_never_reruns() {
        let req = ActionRequest::from_value("book_hotel", json!({"hotel_name": "如家"}), "call_1");
        let (content, status) = settle_interrupted(&req, &Decision::Approve).record();
        assert_eq!(status, crate::memory::ResultStatus::Failed);
        assert!(content.starts_with("Error:"));
        assert!(content.contains("call_1"));
        assert!(content.contains("outcome is unknown"));

        let out = settle_interrupted(&req, &Decision::respond("稍后再说"));
        assert_eq!(out, ActionOutcome::Skipped(SkipReason::Responded("稍后再说".into())));
    }

    #[tokio::test]
    async fn test_approve_unknown_action_is_failure_record() {
        let ex = executor();
        let out = resolve(&ex, &ActionRequest::from_value("send_email", json!({}), "e1"), &Decision::Approve).await;
        let (content, _) = out.record();
        assert!(content.starts_with("Error:"));
        assert!(content.contains("send_email"));
    }
}
