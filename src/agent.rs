//! Agent 装配
//!
//! 从 AppConfig 构建各组件并组装 Orchestrator：LLM 后端、动作注册表（内置订票动作 + 配置声明的外部程序动作 + 策略覆盖）、
//! 检查点存储与长期记忆。CLI 与集成测试共用这一套装配逻辑。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::Orchestrator;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    window_from_config, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, InMemoryLongTerm,
    LongTermMemory,
};
use crate::react::{LoopEvent, Planner};
use crate::tools::{
    ActionPolicy, BookHotelTool, BookTrainTicketTool, DecisionKind, PluginTool, QueryTrainTicketsTool,
    ToolExecutor, ToolRegistry,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个AI订票助手。";

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    if provider == "openai" && api_key.is_some() {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            api_key.as_deref(),
            cfg.llm.timeouts.request,
        ))
    } else {
        if provider != "mock" {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
        }
        Arc::new(MockLlmClient)
    }
}

/// 内置动作的默认审批策略：订酒店全部决策可用，订车票不支持 respond，查询无需审查
pub fn build_registry(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register_with_policy(BookHotelTool, ActionPolicy::review());
    tools.register_with_policy(
        BookTrainTicketTool,
        ActionPolicy::review_with([DecisionKind::Approve, DecisionKind::Edit, DecisionKind::Reject]),
    );
    tools.register(QueryTrainTicketsTool);

    for entry in &cfg.tools.plugins {
        tools.register_with_policy(PluginTool::new(entry, cfg.tools.tool_timeout_secs), entry.policy());
        tracing::info!(action = %entry.name, requires_review = entry.requires_review, "plugin action registered");
    }

    for entry in &cfg.review.policies {
        tools.set_policy(entry.action.clone(), entry.policy());
    }
    tools
}

/// 按 [storage].backend 创建检查点存储与长期记忆
pub async fn create_stores(
    cfg: &AppConfig,
) -> anyhow::Result<(Arc<dyn CheckpointStore>, Arc<dyn LongTermMemory>)> {
    match cfg.storage.backend.to_lowercase().as_str() {
        "file" => {
            std::fs::create_dir_all(&cfg.storage.path)
                .with_context(|| format!("create checkpoint dir {}", cfg.storage.path.display()))?;
            let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(&cfg.storage.path));
            let long_term: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTerm::default());
            Ok((store, long_term))
        }
        #[cfg(feature = "async-sqlite")]
        "sqlite" => {
            if let Some(parent) = cfg.storage.path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let store = Arc::new(
                crate::memory::SqliteStore::new(&cfg.storage.path)
                    .await
                    .context("open sqlite store")?,
            );
            let checkpoints: Arc<dyn CheckpointStore> = store.clone();
            let long_term: Arc<dyn LongTermMemory> = store;
            Ok((checkpoints, long_term))
        }
        other => {
            if other != "memory" {
                tracing::warn!(backend = %other, "unsupported storage backend, using in-memory store");
            }
            let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
            let long_term: Arc<dyn LongTermMemory> = Arc::new(InMemoryLongTerm::default());
            Ok((store, long_term))
        }
    }
}

/// 组装完整的 Orchestrator
pub async fn create_orchestrator(
    cfg: &AppConfig,
    event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
) -> anyhow::Result<Orchestrator> {
    let llm = create_llm_from_config(cfg);
    let system_prompt = cfg
        .app
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let planner = Planner::new(llm, system_prompt);
    let executor = ToolExecutor::new(build_registry(cfg), cfg.tools.tool_timeout_secs);
    let (store, long_term) = create_stores(cfg).await?;

    let mut orchestrator = Orchestrator::new(executor, Arc::new(planner), store)
        .with_window(window_from_config(cfg.app.history_window_turns))
        .with_long_term(long_term)
        .with_max_steps(cfg.app.max_steps)
        .with_description_prefix(cfg.review.description_prefix.clone());
    if let Some(tx) = event_tx {
        orchestrator = orchestrator.with_event_tx(tx);
    }
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyEntry;

    #[test]
    fn test_default_registry_policies() {
        let registry = build_registry(&AppConfig::default());
        assert!(registry.policy_for("book_hotel").allows(DecisionKind::Respond));
        assert!(!registry.policy_for("book_train_ticket").allows(DecisionKind::Respond));
        assert!(!registry.policy_for("query_train_tickets").requires_review);
    }

    #[test]
    fn test_policy_override() {
        let mut cfg = AppConfig::default();
        cfg.review.policies.push(PolicyEntry {
            action: "query_train_tickets".into(),
            requires_review: true,
            allowed_decisions: vec![DecisionKind::Approve],
        });
        let registry = build_registry(&cfg);
        let policy = registry.policy_for("query_train_tickets");
        assert!(policy.requires_review);
        assert!(!policy.allows(DecisionKind::Reject));
    }

    #[tokio::test]
    async fn test_file_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.storage.backend = "file".into();
        cfg.storage.path = dir.path().join("cp");
        let orchestrator = create_orchestrator(&cfg, None).await.unwrap();
        assert!(orchestrator.executor().registry().contains("book_hotel"));
        assert!(dir.path().join("cp").is_dir());
    }
}
