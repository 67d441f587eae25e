//! 长期记忆：按用户命名空间存放的自由文本事实
//!
//! 只是一个扁平的关联列表，不做索引与排序；search 目前返回命名空间下的全部事实。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 空记忆时注入给推理引擎的提示
pub const NO_LONG_TERM_MEMORY: &str = "no long-term memory";

/// 长期记忆 trait：按命名空间写入与检索
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// 追加一条事实，返回其 id
    async fn put(&self, namespace: &str, text: &str) -> Result<String, AgentError>;

    /// 检索命名空间下的事实；query 目前不参与过滤
    async fn search(&self, namespace: &str, query: &str) -> Result<Vec<String>, AgentError>;
}

/// 内存实现：namespace -> [(id, text)]，每个命名空间最多 max_entries 条（超出丢弃最旧）
pub struct InMemoryLongTerm {
    store: RwLock<HashMap<String, Vec<(String, String)>>>,
    max_entries: usize,
}

impl InMemoryLongTerm {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

impl Default for InMemoryLongTerm {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTerm {
    async fn put(&self, namespace: &str, text: &str) -> Result<String, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut store = self.store.write().await;
        let facts = store.entry(namespace.to_string()).or_default();
        facts.push((id.clone(), text.trim().to_string()));
        let n = facts.len();
        if n > self.max_entries {
            facts.drain(0..n - self.max_entries);
        }
        Ok(id)
    }

    async fn search(&self, namespace: &str, _query: &str) -> Result<Vec<String>, AgentError> {
        Ok(self
            .store
            .read()
            .await
            .get(namespace)
            .map(|facts| facts.iter().map(|(_, t)| t.clone()).collect())
            .unwrap_or_default())
    }
}

/// 用户命名空间
pub fn user_namespace(user_id: &str) -> String {
    format!("memories/{user_id}")
}

/// 读取用户的全部事实并拼成一段文本；没有事实时返回 NO_LONG_TERM_MEMORY
pub async fn load_long_term_memory(
    memory: &dyn LongTermMemory,
    user_id: &str,
) -> Result<String, AgentError> {
    let facts = memory.search(&user_namespace(user_id), "").await?;
    if facts.is_empty() {
        tracing::info!(user_id = %user_id, "long-term memory: none");
        return Ok(NO_LONG_TERM_MEMORY.to_string());
    }
    let info = facts.join(" ");
    tracing::info!(user_id = %user_id, facts = facts.len(), "long-term memory loaded");
    Ok(info)
}

/// 从用户输入中提取「记住：xxx」/「remember: xxx」类内容
pub fn extract_remember_content(input: &str) -> Option<String> {
    let input = input.trim();
    let lower = input.to_lowercase();
    let after = if let Some(idx) = input.find("记住") {
        input.get(idx + "记住".len()..)?
    } else if lower.starts_with("remember") {
        input.get("remember".len()..)?
    } else {
        return None;
    };
    let sep = after.find('：').map(|i| i + '：'.len_utf8()).or_else(|| after.find(':').map(|i| i + 1))?;
    let content = after.get(sep..)?.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}
