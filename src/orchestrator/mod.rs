//! 多agent编排：会话管理与一轮对话的执行

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentContext, ChatRole, ChatTurn};
use crate::knowledge_base::NewKnowledgeBase;
use crate::state::{AuditEntry, ConversationState, SessionStore, SessionUpdate, StateSummary};

mod graph;
pub mod routing;

pub use graph::{Graph, TurnOutcome};
pub use routing::{Route, RouteDecision, TerminationReason};

const ORCHESTRATOR: &str = "orchestrator";
const DEMO_KB_NAME: &str = "Demo Knowledge Base";
const FALLBACK_REPLY: &str = "I wasn't able to produce a response. Please try rephrasing your request.";
const RECURSION_LIMIT_REPLY: &str =
    "⚠️ The request needed too many agent steps and was stopped. Please try a more specific request.";

pub fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// 编排器：持有会话存储与agent图，一次处理一条消息
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    ctx: AgentContext,
    graph: Graph,
    session_id: String,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn SessionStore>, ctx: AgentContext) -> Self {
        let graph = Graph::new(&ctx);
        Self {
            store,
            ctx,
            graph,
            session_id: new_session_id(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// 建表，并为会话选定一个知识库
    pub async fn initialize(&self) -> Result<()> {
        self.store.ensure_schema().await?;
        self.ctx.knowledge_base.ensure_schema().await?;

        let session = self.store.initialize_session(&self.session_id, None).await?;
        if session.knowledge_base_id.is_some() {
            return Ok(());
        }

        let kbs = self.ctx.knowledge_base.get_knowledge_bases().await?;
        let kb = match kbs.into_iter().find(|kb| kb.is_active) {
            Some(kb) => kb,
            None => {
                info!("📚 没有可用的知识库，创建 {}", DEMO_KB_NAME);
                self.ctx
                    .knowledge_base
                    .insert_knowledge_base(NewKnowledgeBase {
                        name: DEMO_KB_NAME.to_string(),
                        description: "A starter knowledge base for trying out the agents".to_string(),
                        author_id: 1,
                        gitlab_project_id: None,
                    })
                    .await?
            }
        };

        self.store
            .update_session_context(
                &self.session_id,
                ORCHESTRATOR,
                SessionUpdate {
                    knowledge_base_id: Some(kb.id.to_string()),
                    knowledge_base_name: Some(kb.name.clone()),
                    ..Default::default()
                },
            )
            .await?;
        println!("📚 当前知识库: {} (ID: {})", kb.name, kb.id);
        Ok(())
    }

    /// 处理一条消息，返回给用户的回复
    ///
    /// agent执行失败时会话标记为error，失败信息作为回复返回。
    pub async fn process_message(&self, text: &str, role: &str) -> Result<String> {
        match self.run_turn(text, role).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                error!("❌ 处理消息失败: {}", e);
                self.store
                    .set_conversation_state(&self.session_id, ORCHESTRATOR, ConversationState::Error)
                    .await?;
                Ok(format!("❌ Error processing message: {}", e))
            }
        }
    }

    async fn run_turn(&self, text: &str, role: &str) -> Result<String> {
        let session_id = self.session_id.as_str();
        let context = self.store.initialize_session(session_id, None).await?;
        self.store.set_active(session_id, true).await?;
        if matches!(
            context.conversation_state,
            ConversationState::Completed | ConversationState::Error
        ) {
            self.store
                .set_conversation_state(session_id, ORCHESTRATOR, ConversationState::Active)
                .await?;
        }

        let order = self
            .store
            .add_conversation_message(session_id, role, text, None, json!({}))
            .await?;
        let history: Vec<_> = self
            .store
            .get_conversation_history(session_id, self.ctx.config.orchestrator.history_limit)
            .await?
            .into_iter()
            .filter(|record| record.order != order)
            .collect();

        let mut state = self.store.load_state(session_id, &history).await?;
        state.messages.push(ChatTurn {
            role: role.parse().unwrap_or(ChatRole::User),
            content: text.to_string(),
        });
        state
            .session_data
            .insert("session_id".to_string(), json!(session_id));
        state.session_data.insert(
            "conversation_state".to_string(),
            json!(ConversationState::Active.as_str()),
        );

        let started = Instant::now();
        let outcome = self.graph.run(state, &self.ctx).await;
        info!(
            "⏱️ 本轮耗时 {:.2}秒, {} 步, 结束原因: {}",
            started.elapsed().as_secs_f64(),
            outcome.state.recursions,
            outcome.termination
        );

        self.store
            .merge_state(session_id, &outcome.state, outcome.last_agent.as_str())
            .await?;

        if let Some(e) = &outcome.state.error {
            self.store
                .set_conversation_state(session_id, ORCHESTRATOR, ConversationState::Error)
                .await?;
            let reply = format!("❌ Error processing message: {}", e);
            self.persist_reply(&reply).await?;
            return Ok(reply);
        }

        if outcome.mark_completed {
            warn!("⚠️ 会话达到递归上限，标记为completed");
            self.store
                .set_conversation_state(session_id, ORCHESTRATOR, ConversationState::Completed)
                .await?;
        }

        let reply = match outcome.state.messages.last() {
            Some(turn) if turn.role == ChatRole::Assistant => turn.content.clone(),
            _ if outcome.mark_completed => RECURSION_LIMIT_REPLY.to_string(),
            _ => FALLBACK_REPLY.to_string(),
        };
        self.persist_reply(&reply).await?;
        Ok(reply)
    }

    async fn persist_reply(&self, reply: &str) -> Result<()> {
        self.store
            .add_conversation_message(
                &self.session_id,
                ChatRole::Assistant.as_str(),
                reply,
                Some("UserProxy"),
                json!({}),
            )
            .await?;
        Ok(())
    }

    /// 清空当前会话并开始一个新会话，保留当前知识库
    pub async fn clear_conversation_state(&mut self) -> Result<()> {
        let knowledge_base = self
            .store
            .get_session_context(&self.session_id)
            .await?
            .and_then(|context| context.knowledge_base_id.zip(context.knowledge_base_name));
        self.store.clear_session(&self.session_id).await?;

        self.session_id = new_session_id();
        self.store.initialize_session(&self.session_id, None).await?;
        if let Some((id, name)) = knowledge_base {
            self.store
                .update_session_context(
                    &self.session_id,
                    ORCHESTRATOR,
                    SessionUpdate {
                        knowledge_base_id: Some(id),
                        knowledge_base_name: Some(name),
                        ..Default::default()
                    },
                )
                .await?;
        }
        info!("🔄 新会话: {}", self.session_id);
        Ok(())
    }

    pub async fn session_summary(&self) -> Result<StateSummary> {
        Ok(self.store.get_state_summary(&self.session_id).await?)
    }

    pub async fn audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(self.store.get_audit_trail(&self.session_id, limit).await?)
    }
}

// Include tests
#[cfg(test)]
mod tests;
