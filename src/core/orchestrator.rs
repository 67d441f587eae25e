//! 主控循环：start_or_continue
//!
//! 一次调用 = 独占会话 -> 读检查点 -> 推进状态 -> 提交检查点（每次提交 version+1）。
//! 推进过程：推理 -> 无需审查的动作立即执行 -> 需要审查的动作合并为一个 Suspension 并返回；
//! 收到决策后先整体校验，通过后先提交「挂起已消费」，再按位置落实并提交结果，然后回到推理。
//! 自动执行的结果同样在下一次推理前提交。出错时已提交的进度保留，未提交的部分丢弃；
//! 原样重试会从已提交处继续，已执行的动作不会再执行。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::resume::{parse_decisions, resolve, settle_interrupted, validate_decisions};
use crate::core::{
    ActionOutcome, AgentError, ConversationState, Decision, LoopPhase, ReviewConfig,
    SessionSupervisor, Suspension,
};
use crate::memory::{
    extract_remember_content, load_long_term_memory, user_namespace, ActionRequest, Checkpoint,
    CheckpointStore, HistoryWindow, KeepAll, LongTermMemory, NO_LONG_TERM_MEMORY,
};
use crate::react::{Generation, LoopEvent, ReasoningEngine};
use crate::tools::ToolExecutor;

pub const DEFAULT_MAX_STEPS: usize = 20;
pub const DEFAULT_DESCRIPTION_PREFIX: &str = "Tool execution pending approval";
/// 最终回复按此字符数切分为 MessageChunk
const CHUNK_CHARS: usize = 16;
/// ActionResult 事件中的预览长度
const PREVIEW_CHARS: usize = 200;

/// 调用方输入
#[derive(Debug, Clone)]
pub enum Input {
    /// 新的用户消息；user_id 用于长期记忆命名空间
    UserMessage { text: String, user_id: Option<String> },
    /// 对当前挂起的决策，与 pending_requests 按位置对应
    Decisions(Vec<Decision>),
    /// JSON 形式的决策（兼容别名写法），解析后同 Decisions
    RawDecisions(Vec<Value>),
}

impl Input {
    pub fn user(text: impl Into<String>) -> Self {
        Input::UserMessage {
            text: text.into(),
            user_id: None,
        }
    }

    pub fn user_with_id(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Input::UserMessage {
            text: text.into(),
            user_id: Some(user_id.into()),
        }
    }

    pub fn decisions(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Input::Decisions(decisions.into_iter().collect())
    }
}

/// 一次调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 本轮结束，附最终回复
    Completed { response: String },
    /// 挂起，等待人工决策
    AwaitingReview(Suspension),
}

impl RunOutcome {
    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            RunOutcome::AwaitingReview(s) => Some(s),
            RunOutcome::Completed { .. } => None,
        }
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed { response } => Some(response),
            RunOutcome::AwaitingReview(_) => None,
        }
    }
}

pub struct Orchestrator {
    executor: ToolExecutor,
    engine: Arc<dyn ReasoningEngine>,
    store: Arc<dyn CheckpointStore>,
    window: Box<dyn HistoryWindow>,
    long_term: Option<Arc<dyn LongTermMemory>>,
    supervisor: SessionSupervisor,
    max_steps: usize,
    description_prefix: String,
    event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl Orchestrator {
    pub fn new(
        executor: ToolExecutor,
        engine: Arc<dyn ReasoningEngine>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            executor,
            engine,
            store,
            window: Box::new(KeepAll),
            long_term: None,
            supervisor: SessionSupervisor::new(),
            max_steps: DEFAULT_MAX_STEPS,
            description_prefix: DEFAULT_DESCRIPTION_PREFIX.to_string(),
            event_tx: None,
        }
    }

    pub fn with_window(mut self, window: Box<dyn HistoryWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn with_long_term(mut self, long_term: Arc<dyn LongTermMemory>) -> Self {
        self.long_term = Some(long_term);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_description_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.description_prefix = prefix.into();
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 读取会话当前保存的状态（不存在返回 None）
    pub async fn snapshot(&self, conversation_id: &str) -> Result<Option<ConversationState>, AgentError> {
        match self.store.load(conversation_id).await? {
            Some(cp) => Ok(Some(restore_checked(conversation_id, &cp)?)),
            None => Ok(None),
        }
    }

    /// 唯一入口：开始新一轮或继续挂起的会话
    pub async fn start_or_continue(
        &self,
        conversation_id: &str,
        input: Input,
    ) -> Result<RunOutcome, AgentError> {
        let _guard = self.supervisor.acquire(conversation_id)?;
        match self.invoke(conversation_id, input).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.emit(LoopEvent::Error { text: e.to_string() });
                Err(e)
            }
        }
    }

    async fn invoke(&self, conversation_id: &str, input: Input) -> Result<RunOutcome, AgentError> {
        let loaded = self.store.load(conversation_id).await?;
        let mut version = loaded.as_ref().map(|cp| cp.version).unwrap_or(0);
        let mut state = match &loaded {
            Some(cp) => restore_checked(conversation_id, cp)?,
            None => ConversationState::new(conversation_id),
        };

        let mut fact = None;
        let outcome = match input {
            Input::UserMessage { text, user_id } => {
                fact = self.begin_turn(&mut state, text, user_id)?;
                self.drive(&mut state, &mut version, fact.as_deref()).await?
            }
            Input::Decisions(decisions) => self.continue_with(&mut state, &mut version, decisions).await?,
            Input::RawDecisions(raw) => {
                let decisions = match &state.pending {
                    Some(suspension) if state.is_awaiting_review() => parse_decisions(suspension, &raw)?,
                    _ => Vec::new(),
                };
                self.continue_with(&mut state, &mut version, decisions).await?
            }
        };
        self.commit(&state, &mut version).await?;

        // 事实只在本轮提交之后写入，失败的调用不会留下事实
        if let Some(fact) = fact {
            self.remember(&state, &fact).await;
        }
        Ok(outcome)
    }

    /// 追加用户消息，返回待写入长期记忆的事实
    fn begin_turn(
        &self,
        state: &mut ConversationState,
        text: String,
        user_id: Option<String>,
    ) -> Result<Option<String>, AgentError> {
        if state.is_awaiting_review() {
            return Err(AgentError::ReviewPending(state.conversation_id.clone()));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput("empty user message".to_string()));
        }
        if user_id.is_some() {
            state.user_id = user_id;
        }
        self.settle_in_flight(state)?;

        // 上次同一条消息中途失败：沿用已保存的记录，不重复追加
        if state.is_interrupted() && state.log.last_user() == Some(text) {
            tracing::info!(conversation_id = %state.conversation_id, "continuing interrupted turn");
        } else {
            state.log.push_user(text);
        }
        state.phase = LoopPhase::Running;

        Ok(match (&self.long_term, &state.user_id) {
            (Some(_), Some(_)) => extract_remember_content(text),
            _ => None,
        })
    }

    /// 处理决策输入：正常挂起走 resume；上次调用中断时接着推进，不再执行任何已落实的动作
    async fn continue_with(
        &self,
        state: &mut ConversationState,
        version: &mut u64,
        decisions: Vec<Decision>,
    ) -> Result<RunOutcome, AgentError> {
        if state.in_flight.is_some() || state.is_interrupted() {
            tracing::info!(
                conversation_id = %state.conversation_id,
                "decisions already consumed by an interrupted call; continuing from saved results"
            );
            self.settle_in_flight(state)?;
            return self.drive(state, version, None).await;
        }
        let suspension = match (&state.pending, state.phase) {
            (Some(s), LoopPhase::AwaitingReview) => s.clone(),
            _ => return Err(AgentError::NoPendingSuspension(state.conversation_id.clone())),
        };
        self.resume(state, version, suspension, decisions).await
    }

    async fn resume(
        &self,
        state: &mut ConversationState,
        version: &mut u64,
        suspension: Suspension,
        decisions: Vec<Decision>,
    ) -> Result<RunOutcome, AgentError> {
        validate_decisions(&suspension, &decisions, &self.executor)?;
        let count = decisions.len();
        state.begin_resolution(decisions);
        // 先落盘「决策已消费」，之后任何失败都不会让同一批动作再执行一次
        self.commit(state, version).await?;
        tracing::info!(conversation_id = %state.conversation_id, decisions = count, "resuming with decisions");
        self.emit(LoopEvent::Resumed { decisions: count });

        if let Some(in_flight) = state.in_flight.clone() {
            for (request, decision) in in_flight.requests.iter().zip(&in_flight.decisions) {
                let outcome = resolve(&self.executor, request, decision).await;
                self.record(state, request, &outcome)?;
            }
        }
        state.in_flight = None;
        self.commit(state, version).await?;
        self.drive(state, version, None).await
    }

    /// 写回上次中断时未记录结果的决策
    fn settle_in_flight(&self, state: &mut ConversationState) -> Result<(), AgentError> {
        let Some(in_flight) = state.in_flight.take() else {
            return Ok(());
        };
        let open = state.log.pending_call_ids();
        for (request, decision) in in_flight.requests.iter().zip(&in_flight.decisions) {
            if open.contains(&request.call_id) {
                tracing::warn!(
                    conversation_id = %state.conversation_id,
                    call_id = %request.call_id,
                    "result of interrupted action unknown"
                );
                self.record(state, request, &settle_interrupted(request, decision))?;
            }
        }
        Ok(())
    }

    /// 「记住：xxx」写入用户长期记忆；本轮已提交，写入失败只记日志
    async fn remember(&self, state: &ConversationState, fact: &str) {
        let (Some(long_term), Some(user_id)) = (&self.long_term, &state.user_id) else {
            return;
        };
        match long_term.put(&user_namespace(user_id), fact).await {
            Ok(_) => tracing::info!(user_id = %user_id, "long-term fact stored"),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "long-term fact not stored"),
        }
    }

    /// 已存事实加上本轮尚未写入的事实
    async fn facts_for(&self, state: &ConversationState, fresh: Option<&str>) -> Result<String, AgentError> {
        let stored = match (&self.long_term, &state.user_id) {
            (Some(long_term), Some(user_id)) => load_long_term_memory(long_term.as_ref(), user_id).await?,
            _ => NO_LONG_TERM_MEMORY.to_string(),
        };
        Ok(match fresh {
            Some(fact) if stored == NO_LONG_TERM_MEMORY => fact.to_string(),
            Some(fact) => format!("{stored} {fact}"),
            None => stored,
        })
    }

    /// 校验存储版本未被他人推进后写入 version+1
    async fn commit(&self, state: &ConversationState, version: &mut u64) -> Result<(), AgentError> {
        let id = state.conversation_id.as_str();
        let current = self.store.load(id).await?.map(|cp| cp.version).unwrap_or(0);
        if current != *version {
            return Err(AgentError::Persistence(format!(
                "checkpoint for {id} moved from version {version} to {current} during this call"
            )));
        }
        let checkpoint = Checkpoint::capture(id, *version + 1, state)?;
        self.store.save(id, &checkpoint).await?;
        *version = checkpoint.version;
        tracing::debug!(conversation_id = %id, version = checkpoint.version, phase = ?state.phase, "checkpoint saved");
        Ok(())
    }

    /// 推理-执行循环，直到给出最终回复、产生挂起或达到步数上限
    async fn drive(
        &self,
        state: &mut ConversationState,
        version: &mut u64,
        fresh_fact: Option<&str>,
    ) -> Result<RunOutcome, AgentError> {
        let descriptors = self.executor.registry().descriptors();

        for step in 1..=self.max_steps {
            self.emit(LoopEvent::Thinking {
                step,
                max_steps: self.max_steps,
            });
            let facts = self.facts_for(state, fresh_fact).await?;
            let history = self.window.window(state.log.turns());
            let generation = self.engine.generate(history, &descriptors, &facts).await?;

            let requests = match generation {
                Generation::Message(text) => return Ok(self.finish(state, text)),
                Generation::Actions(requests) if requests.is_empty() => {
                    return Ok(self.finish(state, String::new()))
                }
                Generation::Actions(requests) => requests,
            };

            for request in &requests {
                state.log.push_invocation(request.clone());
            }

            let mut pending: Vec<(ActionRequest, ReviewConfig)> = Vec::new();
            let mut executed = 0;
            for request in requests {
                if !self.executor.registry().contains(&request.name) {
                    let err = AgentError::UnknownAction(request.name.clone());
                    tracing::warn!(conversation_id = %state.conversation_id, call_id = %request.call_id, "{}", err);
                }
                let policy = self.executor.policy_for(&request.name);
                self.emit(LoopEvent::ActionRequested {
                    name: request.name.clone(),
                    call_id: request.call_id.clone(),
                    args: request.arguments_value(),
                    requires_review: policy.requires_review,
                });
                if policy.requires_review {
                    let config = ReviewConfig::from_policy(&request.name, &policy);
                    pending.push((request, config));
                } else {
                    let outcome = self.executor.run(&request).await;
                    self.record(state, &request, &outcome)?;
                    executed += 1;
                }
            }

            if !pending.is_empty() {
                let suspension = self.build_suspension(&state.conversation_id, pending);
                tracing::info!(
                    conversation_id = %state.conversation_id,
                    pending = suspension.len(),
                    "suspended for review"
                );
                self.emit(LoopEvent::Suspended {
                    pending: suspension.len(),
                    description: suspension.description.clone(),
                });
                state.suspend(suspension.clone());
                return Ok(RunOutcome::AwaitingReview(suspension));
            }

            // 自动执行的结果先落盘，再进入下一次推理
            if executed > 0 {
                self.commit(state, version).await?;
            }
        }

        tracing::warn!(conversation_id = %state.conversation_id, max_steps = self.max_steps, "step limit reached");
        let text = format!(
            "Stopped after reaching the maximum of {} reasoning steps without a final answer.",
            self.max_steps
        );
        Ok(self.finish(state, text))
    }

    fn finish(&self, state: &mut ConversationState, text: String) -> RunOutcome {
        state.log.push_assistant(text.clone());
        state.terminate();
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(CHUNK_CHARS) {
            self.emit(LoopEvent::MessageChunk {
                text: chunk.iter().collect(),
            });
        }
        self.emit(LoopEvent::MessageDone);
        RunOutcome::Completed { response: text }
    }

    fn record(
        &self,
        state: &mut ConversationState,
        request: &ActionRequest,
        outcome: &ActionOutcome,
    ) -> Result<(), AgentError> {
        let (content, status) = outcome.record();
        self.emit(LoopEvent::ActionResult {
            name: request.name.clone(),
            call_id: request.call_id.clone(),
            status,
            preview: content.chars().take(PREVIEW_CHARS).collect(),
        });
        state
            .log
            .push_result(&request.call_id, &request.name, content, status)
            .map_err(AgentError::InvalidInput)
    }

    fn build_suspension(&self, conversation_id: &str, pending: Vec<(ActionRequest, ReviewConfig)>) -> Suspension {
        let mut description = self.description_prefix.clone();
        for (request, _) in &pending {
            description.push_str(&format!(
                "\n\nTool: {}\nArgs: {}",
                request.name,
                request.arguments_value()
            ));
        }
        let (pending_requests, review_configs) = pending.into_iter().unzip();
        Suspension {
            conversation_id: conversation_id.to_string(),
            pending_requests,
            review_configs,
            description,
        }
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// 还原检查点，并确认它属于所请求的会话
fn restore_checked(conversation_id: &str, checkpoint: &Checkpoint) -> Result<ConversationState, AgentError> {
    let state: ConversationState = checkpoint.restore()?;
    if checkpoint.conversation_id != conversation_id || state.conversation_id != conversation_id {
        return Err(AgentError::Persistence(format!(
            "checkpoint loaded for {conversation_id} belongs to {}",
            checkpoint.conversation_id
        )));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCheckpointStore, InMemoryLongTerm, ResultStatus};
    use crate::react::ScriptedEngine;
    use crate::tools::{ActionPolicy, BookHotelTool, QueryTrainTicketsTool, ToolRegistry};
    use serde_json::json;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(BookHotelTool, ActionPolicy::review());
        registry.register(QueryTrainTicketsTool);
        ToolExecutor::new(registry, 5)
    }

    fn hotel(id: &str) -> ActionRequest {
        ActionRequest::from_value("book_hotel", json!({"hotel_name": "如家酒店"}), id)
    }

    #[tokio::test]
    async fn test_suspend_then_approve() {
        let engine = Arc::new(ScriptedEngine::new([
            Generation::Actions(vec![hotel("c1")]),
            Generation::Message("订好了".into()),
        ]));
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orch = Orchestrator::new(executor(), engine.clone(), store.clone());

        let out = orch.start_or_continue("t1", Input::user("帮我预定一个如家酒店")).await.unwrap();
        let s = out.suspension().unwrap();
        assert_eq!(s.pending_requests[0].call_id, "c1");
        assert!(s.description.starts_with(DEFAULT_DESCRIPTION_PREFIX));
        assert_eq!(s.review_configs[0].action_name, "book_hotel");

        let out = orch.start_or_continue("t1", Input::decisions([Decision::Approve])).await.unwrap();
        assert_eq!(out.response(), Some("订好了"));

        let state = orch.snapshot("t1").await.unwrap().unwrap();
        assert_eq!(state.phase, LoopPhase::Terminated);
        assert!(state.log.is_well_ordered());
        assert!(state.log.pending_call_ids().is_empty());
        // 挂起、消费挂起、写回结果、最终回复各提交一次
        assert_eq!(store.load("t1").await.unwrap().unwrap().version, 4);
    }

    #[tokio::test]
    async fn test_checkpoint_of_other_conversation_is_refused() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let foreign = Checkpoint::capture("user:1", 1, &ConversationState::new("user:1")).unwrap();
        store.save("user_1", &foreign).await.unwrap();

        let engine = Arc::new(ScriptedEngine::new([]));
        let orch = Orchestrator::new(executor(), engine.clone(), store.clone());
        let err = orch.start_or_continue("user_1", Input::user("hi")).await.unwrap_err();
        assert!(matches!(err, AgentError::Persistence(ref m) if m.contains("user:1")));
        assert_eq!(engine.call_count(), 0);
        assert!(orch.snapshot("user_1").await.is_err());
    }

    #[tokio::test]
    async fn test_user_message_while_pending() {
        let engine = Arc::new(ScriptedEngine::new([Generation::Actions(vec![hotel("c1")])]));
        let orch = Orchestrator::new(executor(), engine, Arc::new(InMemoryCheckpointStore::new()));
        orch.start_or_continue("t1", Input::user("订酒店")).await.unwrap();
        let err = orch.start_or_continue("t1", Input::user("还在吗")).await.unwrap_err();
        assert!(matches!(err, AgentError::ReviewPending(_)));
        let state = orch.snapshot("t1").await.unwrap().unwrap();
        assert!(state.is_awaiting_review());
    }

    #[tokio::test]
    async fn test_raw_decisions_and_auto_actions() {
        let engine = Arc::new(ScriptedEngine::new([
            Generation::Actions(vec![
                ActionRequest::from_value(
                    "query_train_tickets",
                    json!({"from": "北京", "to": "上海", "date": "2025-06-01"}),
                    "q1",
                ),
                hotel("c1"),
            ]),
            Generation::Message("ok".into()),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = Orchestrator::new(executor(), engine, Arc::new(InMemoryCheckpointStore::new()))
            .with_event_tx(tx);

        let out = orch.start_or_continue("t1", Input::user("查票并订酒店")).await.unwrap();
        assert_eq!(out.suspension().unwrap().len(), 1);
        let state = orch.snapshot("t1").await.unwrap().unwrap();
        // 查询已执行，酒店仍待审批
        assert_eq!(state.log.pending_call_ids(), vec!["c1".to_string()]);

        let out = orch
            .start_or_continue("t1", Input::RawDecisions(vec![json!({"type": "response", "args": "不用了"})]))
            .await
            .unwrap();
        assert_eq!(out.response(), Some("ok"));
        let state = orch.snapshot("t1").await.unwrap().unwrap();
        assert!(state.log.turns().iter().any(|t| matches!(
            t,
            crate::memory::ConversationTurn::ActionResult { status: ResultStatus::Responded, content, .. } if content == "不用了"
        )));

        let mut saw_suspended = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, LoopEvent::Suspended { pending: 1, .. }) {
                saw_suspended = true;
            }
        }
        assert!(saw_suspended);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let looping: Vec<Generation> = (0..5)
            .map(|i| {
                Generation::Actions(vec![ActionRequest::from_value(
                    "query_train_tickets",
                    json!({"from": "A", "to": "B", "date": "2025-06-01"}),
                    format!("q{i}"),
                )])
            })
            .collect();
        let engine = Arc::new(ScriptedEngine::new(looping));
        let orch = Orchestrator::new(executor(), engine.clone(), Arc::new(InMemoryCheckpointStore::new()))
            .with_max_steps(3);
        let out = orch.start_or_continue("t1", Input::user("loop")).await.unwrap();
        assert!(out.response().unwrap().contains("maximum of 3"));
        assert_eq!(engine.call_count(), 3);
    }

    #[tokio::test]
    async fn test_remember_and_facts() {
        let engine = Arc::new(ScriptedEngine::new([]));
        let orch = Orchestrator::new(executor(), engine.clone(), Arc::new(InMemoryCheckpointStore::new()))
            .with_long_term(Arc::new(InMemoryLongTerm::default()));

        orch.start_or_continue("t1", Input::user_with_id("记住：我喜欢靠窗的座位", "u1"))
            .await
            .unwrap();
        orch.start_or_continue("t2", Input::user("hi")).await.unwrap();
        orch.start_or_continue("t3", Input::user_with_id("订票", "u1")).await.unwrap();
        let calls = engine.calls();
        assert!(calls[0].long_term_facts.contains("我喜欢靠窗的座位"));
        assert_eq!(calls[1].long_term_facts, NO_LONG_TERM_MEMORY);
        assert_eq!(calls[2].long_term_facts.matches("我喜欢靠窗的座位").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let orch = Orchestrator::new(
            executor(),
            Arc::new(ScriptedEngine::new([])),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        assert!(matches!(
            orch.start_or_continue("t1", Input::user("   ")).await,
            Err(AgentError::InvalidInput(_))
        ));
        assert!(orch.snapshot("t1").await.unwrap().is_none());
    }
}
