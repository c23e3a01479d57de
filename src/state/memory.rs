//! 进程内会话存储，语义与PostgreSQL实现一致

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AgentSnapshot, AuditEntry, ChangeType, ConversationRecord, SessionContext, SessionStore,
    SessionUpdate, StateResult, StateSummary, conversation_audit_value,
};
use crate::error::StateError;

struct SessionRow {
    context: SessionContext,
    snapshot: AgentSnapshot,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<ConversationRecord>,
    audit: Vec<AuditEntry>,
}

impl SessionRow {
    fn new(context: SessionContext) -> Self {
        let now = Utc::now();
        Self {
            context,
            snapshot: AgentSnapshot::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            audit: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// 内存会话存储
#[derive(Default)]
pub struct MemoryStateStore {
    sessions: RwLock<HashMap<String, SessionRow>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(session_id: &str) -> StateError {
    StateError::NotFound(session_id.to_string())
}

#[async_trait]
impl SessionStore for MemoryStateStore {
    async fn ensure_schema(&self) -> StateResult<()> {
        Ok(())
    }

    async fn initialize_session(
        &self,
        session_id: &str,
        knowledge_base_id: Option<String>,
    ) -> StateResult<SessionContext> {
        let mut sessions = self.sessions.write().await;
        if let Some(row) = sessions.get_mut(session_id) {
            row.is_active = true;
            row.touch();
            return Ok(row.context.clone());
        }

        let mut context = SessionContext::new(session_id);
        context.knowledge_base_id = knowledge_base_id;
        context.validate()?;

        let mut row = SessionRow::new(context.clone());
        row.audit.push(AuditEntry::new(
            ChangeType::Create,
            "session",
            None,
            Some(json!({ "session_id": session_id })),
            "System",
            Uuid::new_v4(),
        ));
        sessions.insert(session_id.to_string(), row);
        Ok(context)
    }

    async fn get_session_context(&self, session_id: &str) -> StateResult<Option<SessionContext>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|row| row.context.clone()))
    }

    async fn update_session_context(
        &self,
        session_id: &str,
        agent: &str,
        update: SessionUpdate,
    ) -> StateResult<SessionContext> {
        let mut sessions = self.sessions.write().await;
        let row = sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;

        let mut context = row.context.clone();
        let changes = update.apply(&mut context);
        context.validate()?;

        let correlation_id = Uuid::new_v4();
        for change in changes {
            row.audit.push(AuditEntry::new(
                ChangeType::Update,
                change.path,
                Some(change.old_value),
                Some(change.new_value),
                agent,
                correlation_id,
            ));
        }
        row.context = context.clone();
        row.touch();
        Ok(context)
    }

    async fn get_agent_snapshot(&self, session_id: &str) -> StateResult<Option<AgentSnapshot>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|row| row.snapshot.clone()))
    }

    async fn update_agent_snapshot(
        &self,
        session_id: &str,
        agent: &str,
        mut snapshot: AgentSnapshot,
    ) -> StateResult<()> {
        let mut sessions = self.sessions.write().await;
        let row = sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;

        let previous = row.snapshot.current_agent;
        if previous != snapshot.current_agent {
            let now = Utc::now();
            snapshot.last_agent_switch = Some(now);
            row.audit.push(AuditEntry::new(
                ChangeType::AgentSwitch,
                "agent.current_agent",
                Some(json!(previous)),
                Some(json!(snapshot.current_agent)),
                agent,
                Uuid::new_v4(),
            ));
        } else {
            snapshot.last_agent_switch = row.snapshot.last_agent_switch;
        }
        row.snapshot = snapshot;
        row.touch();
        Ok(())
    }

    async fn add_conversation_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        agent: Option<&str>,
        metadata: Value,
    ) -> StateResult<i32> {
        let mut sessions = self.sessions.write().await;
        let row = sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;

        let order = row.messages.iter().map(|m| m.order).max().unwrap_or(0) + 1;
        row.messages.push(ConversationRecord {
            role: role.to_string(),
            content: content.to_string(),
            agent_name: agent.map(str::to_string),
            metadata,
            order,
            created_at: Utc::now(),
        });
        row.audit.push(AuditEntry::new(
            ChangeType::ConversationUpdate,
            "conversation.message",
            None,
            Some(conversation_audit_value(role, content)),
            agent.unwrap_or("System"),
            Uuid::new_v4(),
        ));
        row.touch();
        Ok(order)
    }

    async fn get_conversation_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> StateResult<Vec<ConversationRecord>> {
        let sessions = self.sessions.read().await;
        let Some(row) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let limit = limit.max(0) as usize;
        let skip = row.messages.len().saturating_sub(limit);
        Ok(row.messages.iter().skip(skip).cloned().collect())
    }

    async fn set_active(&self, session_id: &str, active: bool) -> StateResult<()> {
        let mut sessions = self.sessions.write().await;
        let row = sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        row.is_active = active;
        row.touch();
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> StateResult<()> {
        let mut sessions = self.sessions.write().await;
        let Some(row) = sessions.get_mut(session_id) else {
            return Ok(());
        };
        row.audit.push(AuditEntry::new(
            ChangeType::Delete,
            "session",
            Some(json!({ "session_id": session_id })),
            None,
            "System",
            Uuid::new_v4(),
        ));
        row.messages.clear();
        row.is_active = false;
        row.context = SessionContext::new(session_id);
        row.snapshot = AgentSnapshot::default();
        row.touch();
        Ok(())
    }

    async fn get_state_summary(&self, session_id: &str) -> StateResult<StateSummary> {
        let sessions = self.sessions.read().await;
        let Some(row) = sessions.get(session_id) else {
            return Ok(StateSummary {
                session_id: session_id.to_string(),
                is_active: false,
                session_context: None,
                agent_snapshot: None,
                created_at: None,
                updated_at: None,
                message_count: 0,
                first_message: None,
                last_message: None,
                change_count: 0,
                last_change: None,
            });
        };

        Ok(StateSummary {
            session_id: session_id.to_string(),
            is_active: row.is_active,
            session_context: Some(row.context.clone()),
            agent_snapshot: Some(row.snapshot.clone()),
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
            message_count: row.messages.len() as i64,
            first_message: row.messages.iter().map(|m| m.created_at).min(),
            last_message: row.messages.iter().map(|m| m.created_at).max(),
            change_count: row.audit.len() as i64,
            last_change: row.audit.iter().map(|a| a.timestamp).max(),
        })
    }

    async fn get_audit_trail(&self, session_id: &str, limit: i64) -> StateResult<Vec<AuditEntry>> {
        let sessions = self.sessions.read().await;
        let Some(row) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(row
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
