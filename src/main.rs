//! 订票助手演示 CLI
//!
//! 用法：ticket-assistant [--config <path>] [--thread <id>] [--user <id>] [消息] [决策 JSON]
//! 发送一条用户消息；若产生挂起则打印审批载荷，并用命令行给出的决策（默认 {"type":"approve"}）逐个恢复。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use ticket_assistant::agent::create_orchestrator;
use ticket_assistant::config::{load_config, AppConfig};
use ticket_assistant::core::{Input, RecoveryEngine, RunOutcome};
use ticket_assistant::observability;
use ticket_assistant::react::LoopEvent;

/// 订票助手：敏感操作前挂起等待人工审批
#[derive(Parser, Debug)]
#[command(name = "ticket-assistant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 用户消息
    #[arg(default_value = "预定一个汉庭酒店")]
    message: String,

    /// 对每个待审批动作给出的决策（JSON）
    #[arg(default_value = r#"{"type":"approve"}"#, value_parser = parse_decision)]
    decision: Value,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 会话 id
    #[arg(short, long, default_value = "1")]
    thread: String,

    /// 用户 id（长期记忆命名空间）
    #[arg(short, long)]
    user: Option<String>,
}

fn parse_decision(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid decision JSON: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = Cli::parse();

    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<LoopEvent>();
    let orchestrator = create_orchestrator(&cfg, Some(event_tx))
        .await
        .context("Failed to create orchestrator")?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                tracing::debug!(event = %line, "loop event");
            }
        }
    });

    let recovery = RecoveryEngine::new();
    let input = Input::UserMessage {
        text: args.message.clone(),
        user_id: args.user.clone(),
    };
    let mut outcome = orchestrator.start_or_continue(&args.thread, input).await;

    loop {
        match outcome {
            Ok(RunOutcome::Completed { response }) => {
                println!("agent_response: {response}");
                break;
            }
            Ok(RunOutcome::AwaitingReview(suspension)) => {
                println!("{}", serde_json::to_string_pretty(&suspension)?);
                let decisions = vec![args.decision.clone(); suspension.len()];
                println!("resuming with {} decision(s): {}", decisions.len(), args.decision);
                outcome = orchestrator
                    .start_or_continue(&args.thread, Input::RawDecisions(decisions))
                    .await;
            }
            Err(e) => {
                eprintln!("error: {e}");
                eprintln!("advice: {:?}", recovery.handle(&e));
                return Err(e).context("invocation failed");
            }
        }
    }

    Ok(())
}
