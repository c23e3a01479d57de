//! 子命令的执行：组装存储与agent上下文，驱动交互循环

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use super::{Args, Command, SessionAction};
use crate::agents::{AgentContext, AgentName};
use crate::config::Config;
use crate::gitlab::GitLabClient;
use crate::knowledge_base::{KnowledgeBaseRepository, MemoryKnowledgeBase, PgKnowledgeBase};
use crate::llm::LLMClient;
use crate::logging;
use crate::orchestrator::Orchestrator;
use crate::state::{AuditEntry, MemoryStateStore, PostgresStateStore, SessionStore, StateSummary};
use crate::swarm::Swarm;

const AUDIT_LINES: i64 = 10;

/// 对话中的一行输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    Reset,
    Agents,
    Summary,
    Audit,
    Empty,
    Message(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => ChatCommand::Empty,
            "/q" | "/quit" | "/exit" => ChatCommand::Quit,
            "/r" | "/reset" => ChatCommand::Reset,
            "/agents" => ChatCommand::Agents,
            "/summary" => ChatCommand::Summary,
            "/audit" => ChatCommand::Audit,
            _ => ChatCommand::Message(trimmed.to_string()),
        }
    }
}

/// swarm交互模式下的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmCommand {
    Start,
    Cycle,
    Status,
    Stop,
    Quit,
    Unknown,
}

impl SwarmCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "start" => SwarmCommand::Start,
            "cycle" => SwarmCommand::Cycle,
            "status" => SwarmCommand::Status,
            "stop" => SwarmCommand::Stop,
            "quit" | "q" | "exit" => SwarmCommand::Quit,
            _ => SwarmCommand::Unknown,
        }
    }
}

/// 解析参数并执行子命令
pub async fn run(args: Args) -> Result<()> {
    let command = args.command();
    let config = args.into_config()?;
    logging::init(config.verbose);
    let config = Arc::new(config);

    let (store, knowledge_base) = build_stores(&config).await?;

    if let Command::Session { action, session_id } = &command {
        let session_id = session_id
            .as_deref()
            .context("--session-id is required for session commands")?;
        return run_session(store, session_id, action).await;
    }

    let gitlab = connect_gitlab(&config).await;
    let llm = LLMClient::new(config.as_ref().clone())?;
    llm.check_connection().await?;
    let ctx = AgentContext::new(Arc::new(llm), knowledge_base, gitlab, config.clone());

    match command {
        Command::Chat { session_id } => {
            let mut orchestrator = Orchestrator::new(store, ctx);
            if let Some(session_id) = session_id {
                orchestrator = orchestrator.with_session_id(session_id);
            }
            orchestrator.initialize().await?;
            run_chat(orchestrator).await
        }
        Command::Swarm { once } => {
            let orchestrator = Orchestrator::new(store, ctx);
            orchestrator.initialize().await?;
            let swarm = Arc::new(Swarm::new(orchestrator, config.swarm.clone()));
            if once {
                let found = swarm.run_cycle().await;
                println!(
                    "{}",
                    if found {
                        "✅ 自治周期完成，已处理工作"
                    } else {
                        "💤 自治周期完成，没有可处理的工作"
                    }
                );
                Ok(())
            } else {
                run_swarm(swarm).await
            }
        }
        Command::Session { .. } => Ok(()),
    }
}

async fn build_stores(
    config: &Config,
) -> Result<(Arc<dyn SessionStore>, Arc<dyn KnowledgeBaseRepository>)> {
    if config.in_memory {
        println!("🧠 使用进程内存储，退出后数据不会保留");
        return Ok((
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryKnowledgeBase::new()),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("无法连接PostgreSQL，可使用 --memory 以进程内存储运行")?;
    Ok((
        Arc::new(PostgresStateStore::new(pool.clone())),
        Arc::new(PgKnowledgeBase::new(pool)),
    ))
}

/// GitLab不可用时降级为无GitLab运行
async fn connect_gitlab(config: &Config) -> Option<Arc<GitLabClient>> {
    if !config.gitlab_enabled() {
        return None;
    }
    match GitLabClient::connect(&config.gitlab).await {
        Ok(client) => {
            println!("🦊 已连接GitLab: {}", config.gitlab.url);
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("⚠️ GitLab不可用，相关工具将被禁用: {}", e);
            None
        }
    }
}

fn prompt(label: &str) -> Result<()> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(())
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

fn print_summary(summary: &StateSummary) {
    println!("📊 会话 {}", summary.session_id);
    println!("   活跃: {}", summary.is_active);
    if let Some(context) = &summary.session_context {
        println!(
            "   知识库: {}",
            context
                .knowledge_base_name
                .as_deref()
                .or(context.knowledge_base_id.as_deref())
                .unwrap_or("-")
        );
        println!("   状态: {}", context.conversation_state);
        if let Some(intent) = &context.user_intent {
            println!("   最近意图: {}", intent);
        }
    }
    if let Some(snapshot) = &summary.agent_snapshot {
        println!("   当前agent: {}", snapshot.current_agent);
    }
    println!("   消息数: {}", summary.message_count);
    println!("   状态变更数: {}", summary.change_count);
}

fn print_audit(entries: &[AuditEntry]) {
    if entries.is_empty() {
        println!("📜 暂无审计记录");
        return;
    }
    println!("📜 最近的审计记录:");
    for entry in entries {
        println!(
            "   {} [{}] {} by {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.change_type.as_str(),
            entry.change_path,
            entry.agent_name.as_deref().unwrap_or("-")
        );
    }
}

async fn run_chat(mut orchestrator: Orchestrator) -> Result<()> {
    println!("🤖 多agent知识库助手 (会话: {})", orchestrator.session_id());
    println!("   /agents 查看agent, /summary 会话摘要, /audit 审计记录, /reset 新会话, /quit 退出");

    let mut lines = stdin_lines();
    loop {
        prompt("\n👤 You: ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ChatCommand::parse(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Agents => {
                for agent in AgentName::ALL {
                    println!("   • {}: {}", agent, agent.role());
                }
            }
            ChatCommand::Reset => {
                orchestrator.clear_conversation_state().await?;
                println!("🔄 已开始新会话: {}", orchestrator.session_id());
            }
            ChatCommand::Summary => print_summary(&orchestrator.session_summary().await?),
            ChatCommand::Audit => print_audit(&orchestrator.audit(AUDIT_LINES).await?),
            ChatCommand::Message(text) => {
                let reply = orchestrator.process_message(&text, "user").await?;
                println!("\n🤖 Assistant: {}", reply);
            }
        }
    }
    println!("👋 再见");
    Ok(())
}

async fn run_swarm(swarm: Arc<Swarm>) -> Result<()> {
    println!("🐝 自治swarm。命令: start, cycle, status, stop, quit");

    let mut background: Option<tokio::task::JoinHandle<()>> = None;
    let mut lines = stdin_lines();
    loop {
        prompt("\n🐝 swarm> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match SwarmCommand::parse(&line) {
            SwarmCommand::Start => {
                if background.as_ref().is_some_and(|h| !h.is_finished()) {
                    println!("⚠️ 自治模式已在运行");
                    continue;
                }
                background = Some(swarm.start());
            }
            SwarmCommand::Cycle => {
                swarm.run_cycle().await;
            }
            SwarmCommand::Status => {
                let status = swarm.status().await;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            SwarmCommand::Stop => {
                swarm.stop();
                if let Some(handle) = background.take() {
                    handle.await?;
                }
            }
            SwarmCommand::Quit => break,
            SwarmCommand::Unknown => println!("❓ 未知命令，可用: start, cycle, status, stop, quit"),
        }
    }

    swarm.stop();
    if let Some(handle) = background.take() {
        handle.await?;
    }
    Ok(())
}

async fn run_session(
    store: Arc<dyn SessionStore>,
    session_id: &str,
    action: &SessionAction,
) -> Result<()> {
    match action {
        SessionAction::Summary => {
            let summary = store.get_state_summary(session_id).await?;
            if summary.session_context.is_none() {
                bail!("session not found: {}", session_id);
            }
            print_summary(&summary);
        }
        SessionAction::Audit { limit } => {
            print_audit(&store.get_audit_trail(session_id, *limit).await?);
        }
        SessionAction::Clear => {
            store.clear_session(session_id).await?;
            println!("🧹 已清理会话 {}", session_id);
        }
    }
    Ok(())
}
