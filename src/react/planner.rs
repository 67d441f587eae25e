//! Planner：基于 LlmClient 的推理引擎
//!
//! 拼接 system prompt（角色设定 + 长期记忆 + 动作列表 + 调用格式），把对话历史渲染为消息后调用 LLM；
//! parse_llm_output 从回复中提取 JSON：`{"tool", "args"}` 或 `{"actions": [...]}` 为动作请求，否则为直接回复。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{to_messages, ActionRequest, ConversationTurn, Message};
use crate::react::{Generation, ReasoningEngine};
use crate::tools::{action_call_schema_json, ActionDescriptor};

/// LLM 返回的单个动作调用（简化 JSON：{"tool": "book_hotel", "args": {"hotel_name": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CallFormat {
    Batch { actions: Vec<ToolCall> },
    Single(ToolCall),
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 解析 LLM 输出：含有效 JSON 且 tool 非空则为动作请求，否则为直接回复
pub fn parse_llm_output(output: &str) -> Result<Generation, AgentError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Ok(Generation::Message(trimmed.to_string()));
        }
    } else {
        return Ok(Generation::Message(trimmed.to_string()));
    };

    let parsed: CallFormat = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    let calls = match parsed {
        CallFormat::Batch { actions } => actions,
        CallFormat::Single(call) => vec![call],
    };
    let requests: Vec<ActionRequest> = calls
        .into_iter()
        .filter(|c| !c.tool.trim().is_empty())
        .map(|c| ActionRequest::from_value(c.tool.trim(), c.args, new_call_id()))
        .collect();

    if requests.is_empty() {
        Ok(Generation::Message(trimmed.to_string()))
    } else {
        Ok(Generation::Actions(requests))
    }
}

/// Planner：持有 LLM 与基础 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 拼接完整 system prompt
    pub fn build_system_prompt(&self, actions: &[ActionDescriptor], long_term_facts: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.system_prompt);
        prompt.push_str("\n\n<long_term_memory>\n");
        prompt.push_str(long_term_facts);
        prompt.push_str("\n</long_term_memory>\n\nAvailable actions:\n");
        for a in actions {
            prompt.push_str(&format!("- {}: {} | parameters: {}\n", a.name, a.description, a.parameters));
        }
        prompt.push_str(
            "\nTo call actions, reply with JSON only, matching this schema \
             (a single {\"tool\", \"args\"} object is also accepted):\n",
        );
        prompt.push_str(&action_call_schema_json());
        prompt.push_str("\nOtherwise reply to the user in plain text.");
        prompt
    }
}

#[async_trait]
impl ReasoningEngine for Planner {
    async fn generate(
        &self,
        history: &[ConversationTurn],
        actions: &[ActionDescriptor],
        long_term_facts: &str,
    ) -> Result<Generation, AgentError> {
        let mut messages = vec![Message::system(self.build_system_prompt(actions, long_term_facts))];
        messages.extend(to_messages(history));
        let output = self.llm.complete(&messages).await.map_err(AgentError::LlmError)?;
        tracing::debug!(output_len = output.len(), "planner output");
        parse_llm_output(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_plain_text() {
        let g = parse_llm_output("已为您预订如家酒店。").unwrap();
        assert_eq!(g, Generation::Message("已为您预订如家酒店。".into()));
    }

    #[test]
    fn test_parse_single_call_in_code_block() {
        let out = "好的\n```json\n{\"tool\": \"book_hotel\", \"args\": {\"hotel_name\": \"如家\"}}\n```";
        match parse_llm_output(out).unwrap() {
            Generation::Actions(reqs) => {
                assert_eq!(reqs.len(), 1);
                assert_eq!(reqs[0].name, "book_hotel");
                assert_eq!(reqs[0].arguments["hotel_name"], "如家");
                assert!(reqs[0].call_id.starts_with("call_"));
            }
            other => panic!("Expected actions, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_batch_unique_ids() {
        let out = r#"{"actions": [{"tool": "book_hotel", "args": {"hotel_name": "A"}}, {"tool": "query_train_tickets", "args": {"from": "北京", "to": "上海", "date": "2025-06-01"}}]}"#;
        match parse_llm_output(out).unwrap() {
            Generation::Actions(reqs) => {
                assert_eq!(reqs.len(), 2);
                assert_ne!(reqs[0].call_id, reqs[1].call_id);
                assert_eq!(reqs[1].name, "query_train_tickets");
            }
            other => panic!("Expected actions, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_llm_output("{not json}"),
            Err(AgentError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_system_prompt_contains_facts_and_actions() {
        let planner = Planner::new(Arc::new(MockLlmClient), "You are a travel assistant.");
        let actions = vec![ActionDescriptor {
            name: "book_hotel".into(),
            description: "Book a hotel".into(),
            parameters: serde_json::json!({}),
            requires_review: true,
        }];
        let prompt = planner.build_system_prompt(&actions, "我的名字叫gq");
        assert!(prompt.starts_with("You are a travel assistant."));
        assert!(prompt.contains("我的名字叫gq"));
        assert!(prompt.contains("book_hotel"));
    }

    #[tokio::test]
    async fn test_generate_with_mock_llm() {
        let planner = Planner::new(Arc::new(MockLlmClient), "sys");
        let history = vec![ConversationTurn::User {
            content: "帮我预定一个如家酒店".into(),
        }];
        let g = planner.generate(&history, &[], "no long-term memory").await.unwrap();
        assert!(matches!(g, Generation::Actions(ref r) if r[0].name == "book_hotel"));
    }
}
