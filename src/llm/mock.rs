//! Mock LLM 客户端（无需 API）
//!
//! 按最后一条 user 消息做确定性回复：订酒店 / 查车票 / 订车票请求输出 JSON 动作调用，
//! 收到 Observation 后输出总结，其余直接回复。用于本地跑通挂起与恢复流程。

use async_trait::async_trait;
use serde_json::json;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient;

/// 从「帮我预定一个如家酒店」或「book hotel Hilton」中取出酒店名
fn hotel_name(text: &str) -> Option<String> {
    if let Some(idx) = text.find("酒店") {
        let before: Vec<char> = text[..idx].chars().collect();
        let start = before
            .iter()
            .rposition(|c| matches!(c, '个' | '定' | '订' | '住' | '在' | ' ' | '，' | ','))
            .map(|p| p + 1)
            .unwrap_or(0);
        let name: String = before[start..].iter().collect();
        return Some(format!("{}酒店", name.trim()));
    }
    let lower = text.to_lowercase();
    let idx = lower.find("hotel")?;
    let rest = text.get(idx + "hotel".len()..)?.trim();
    Some(if rest.is_empty() { "Hotel".to_string() } else { rest.to_string() })
}

fn reply_to(user: &str) -> String {
    if let Some(obs) = user.strip_prefix("Observation from ") {
        let content = obs.split_once("]: ").map(|(_, c)| c).unwrap_or(obs);
        return format!("已处理：{content}");
    }
    let lower = user.to_lowercase();
    if lower.contains("train") || user.contains("火车") || user.contains("高铁") {
        if user.contains("订") || user.contains("定") || lower.contains("book") {
            return json!({"tool": "book_train_ticket", "args": {"train_number": "G1", "date": "2025-06-01"}})
                .to_string();
        }
        return json!({"tool": "query_train_tickets", "args": {"from": "北京", "to": "上海", "date": "2025-06-01"}})
            .to_string();
    }
    if let Some(name) = hotel_name(user) {
        return json!({"tool": "book_hotel", "args": {"hotel_name": name}}).to_string();
    }
    format!("Mock reply: {user}")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(reply_to(last_user))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
