//! 会话状态持久化
//!
//! 每个会话一行上下文（session级字段与agent级快照），外加对话记录与审计日志。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::agents::{AgentMessage, AgentName, ChatRole, ChatTurn, SharedState};
use crate::error::StateError;

mod memory;
mod postgres;

pub use memory::MemoryStateStore;
pub use postgres::PostgresStateStore;

pub type StateResult<T> = Result<T, StateError>;

/// 会话所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    #[default]
    Active,
    Waiting,
    Completed,
    Error,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Active => "active",
            ConversationState::Waiting => "waiting",
            ConversationState::Completed => "completed",
            ConversationState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ConversationState::Active),
            "waiting" => Ok(ConversationState::Waiting),
            "completed" => Ok(ConversationState::Completed),
            "error" => Ok(ConversationState::Error),
            _ => Err(format!("Unknown conversation state: {}", s)),
        }
    }
}

/// 会话级上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_name: Option<String>,
    #[serde(default)]
    pub article_id: Option<String>,
    #[serde(default)]
    pub user_intent: Option<String>,
    /// 0.0-1.0
    #[serde(default)]
    pub intent_confidence: Option<f64>,
    #[serde(default)]
    pub task_context: Map<String, Value>,
    #[serde(default)]
    pub conversation_state: ConversationState,
    #[serde(default)]
    pub current_workflow: Option<String>,
    #[serde(default)]
    pub workflow_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            knowledge_base_id: None,
            knowledge_base_name: None,
            article_id: None,
            user_intent: None,
            intent_confidence: None,
            task_context: Map::new(),
            conversation_state: ConversationState::Active,
            current_workflow: None,
            workflow_step: None,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.session_id.trim().is_empty() {
            return Err(StateError::Validation("session_id is empty".to_string()));
        }
        if let Some(confidence) = self.intent_confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            return Err(StateError::Validation(format!(
                "intent_confidence {} is outside 0.0-1.0",
                confidence
            )));
        }
        Ok(())
    }
}

/// 一个字段的变化，用于审计
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub path: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// 会话上下文的部分更新，None表示不修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub knowledge_base_id: Option<String>,
    pub knowledge_base_name: Option<String>,
    pub article_id: Option<String>,
    pub user_intent: Option<String>,
    pub intent_confidence: Option<f64>,
    pub task_context: Option<Map<String, Value>>,
    pub conversation_state: Option<ConversationState>,
    pub current_workflow: Option<String>,
    pub workflow_step: Option<String>,
}

impl SessionUpdate {
    pub fn conversation_state(state: ConversationState) -> Self {
        Self {
            conversation_state: Some(state),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionUpdate::default()
    }

    /// 应用到上下文，返回实际发生变化的字段
    pub fn apply(&self, ctx: &mut SessionContext) -> Vec<FieldChange> {
        fn set<T: Clone + PartialEq + Serialize>(
            changes: &mut Vec<FieldChange>,
            path: &str,
            target: &mut T,
            value: Option<&T>,
        ) {
            if let Some(value) = value
                && target != value
            {
                changes.push(FieldChange {
                    path: format!("session.{}", path),
                    old_value: serde_json::to_value(&*target).unwrap_or(Value::Null),
                    new_value: serde_json::to_value(value).unwrap_or(Value::Null),
                });
                *target = value.clone();
            }
        }

        let mut changes = Vec::new();
        set(
            &mut changes,
            "knowledge_base_id",
            &mut ctx.knowledge_base_id,
            self.knowledge_base_id.clone().map(Some).as_ref(),
        );
        set(
            &mut changes,
            "knowledge_base_name",
            &mut ctx.knowledge_base_name,
            self.knowledge_base_name.clone().map(Some).as_ref(),
        );
        set(
            &mut changes,
            "article_id",
            &mut ctx.article_id,
            self.article_id.clone().map(Some).as_ref(),
        );
        set(
            &mut changes,
            "user_intent",
            &mut ctx.user_intent,
            self.user_intent.clone().map(Some).as_ref(),
        );
        set(
            &mut changes,
            "intent_confidence",
            &mut ctx.intent_confidence,
            self.intent_confidence.map(Some).as_ref(),
        );
        set(
            &mut changes,
            "task_context",
            &mut ctx.task_context,
            self.task_context.as_ref(),
        );
        set(
            &mut changes,
            "conversation_state",
            &mut ctx.conversation_state,
            self.conversation_state.as_ref(),
        );
        set(
            &mut changes,
            "current_workflow",
            &mut ctx.current_workflow,
            self.current_workflow.clone().map(Some).as_ref(),
        );
        set(
            &mut changes,
            "workflow_step",
            &mut ctx.workflow_step,
            self.workflow_step.clone().map(Some).as_ref(),
        );

        if !changes.is_empty() {
            ctx.last_updated = Utc::now();
        }
        changes
    }
}

/// agent级快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSnapshot {
    pub current_agent: AgentName,
    #[serde(default)]
    pub agent_messages: Vec<AgentMessage>,
    #[serde(default)]
    pub recursions: u32,
    #[serde(default)]
    pub consecutive_tool_calls: u32,
    #[serde(default)]
    pub last_tool_result: Option<String>,
    #[serde(default)]
    pub processed_messages: Vec<Uuid>,
    #[serde(default)]
    pub last_agent_switch: Option<DateTime<Utc>>,
}

impl Default for AgentSnapshot {
    fn default() -> Self {
        Self {
            current_agent: AgentName::UserProxy,
            agent_messages: Vec::new(),
            recursions: 0,
            consecutive_tool_calls: 0,
            last_tool_result: None,
            processed_messages: Vec::new(),
            last_agent_switch: None,
        }
    }
}

impl AgentSnapshot {
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            current_agent: state.current_agent.unwrap_or(AgentName::UserProxy),
            agent_messages: state.agent_messages.clone(),
            recursions: state.recursions,
            consecutive_tool_calls: state.consecutive_tool_calls,
            last_tool_result: state.last_tool_result.clone(),
            processed_messages: state.processed_messages.clone(),
            last_agent_switch: None,
        }
    }
}

/// 审计变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Merge,
    Rollback,
    AgentSwitch,
    ConversationUpdate,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
            ChangeType::Merge => "merge",
            ChangeType::Rollback => "rollback",
            ChangeType::AgentSwitch => "agent_switch",
            ChangeType::ConversationUpdate => "conversation_update",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_lowercase()))
            .map_err(|_| format!("Unknown change type: {}", s))
    }
}

/// 审计记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub change_type: ChangeType,
    pub change_path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub agent_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

impl AuditEntry {
    pub fn new(
        change_type: ChangeType,
        change_path: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        agent_name: &str,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            change_type,
            change_path: change_path.into(),
            old_value,
            new_value,
            agent_name: Some(agent_name.to_string()),
            timestamp: Utc::now(),
            correlation_id: Some(correlation_id),
        }
    }
}

/// 持久化的一条对话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub role: String,
    pub content: String,
    pub agent_name: Option<String>,
    pub metadata: Value,
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

/// 会话状态概要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSummary {
    pub session_id: String,
    pub is_active: bool,
    pub session_context: Option<SessionContext>,
    pub agent_snapshot: Option<AgentSnapshot>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub message_count: i64,
    pub first_message: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub change_count: i64,
    pub last_change: Option<DateTime<Utc>>,
}

/// 审计中对话内容的预览长度
pub(crate) fn content_preview(content: &str) -> String {
    const LIMIT: usize = 100;
    if content.chars().count() > LIMIT {
        format!("{}...", content.chars().take(LIMIT).collect::<String>())
    } else {
        content.to_string()
    }
}

pub(crate) fn conversation_audit_value(role: &str, content: &str) -> Value {
    json!({ "role": role, "content": content_preview(content) })
}

/// 会话状态存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 建表（幂等）
    async fn ensure_schema(&self) -> StateResult<()>;

    /// 会话不存在时创建，存在时重新激活并返回现有上下文
    async fn initialize_session(
        &self,
        session_id: &str,
        knowledge_base_id: Option<String>,
    ) -> StateResult<SessionContext>;

    async fn get_session_context(&self, session_id: &str) -> StateResult<Option<SessionContext>>;

    /// 更新会话上下文，每个变化字段记一条审计
    async fn update_session_context(
        &self,
        session_id: &str,
        agent: &str,
        update: SessionUpdate,
    ) -> StateResult<SessionContext>;

    async fn get_agent_snapshot(&self, session_id: &str) -> StateResult<Option<AgentSnapshot>>;

    /// 覆盖agent快照；current_agent变化时记录agent_switch
    async fn update_agent_snapshot(
        &self,
        session_id: &str,
        agent: &str,
        snapshot: AgentSnapshot,
    ) -> StateResult<()>;

    /// 追加一条对话，返回其序号
    async fn add_conversation_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        agent: Option<&str>,
        metadata: Value,
    ) -> StateResult<i32>;

    /// 最近 `limit` 条对话，按时间正序
    async fn get_conversation_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> StateResult<Vec<ConversationRecord>>;

    async fn set_active(&self, session_id: &str, active: bool) -> StateResult<()>;

    /// 删除对话记录并将会话标记为非活跃，审计日志保留
    async fn clear_session(&self, session_id: &str) -> StateResult<()>;

    async fn get_state_summary(&self, session_id: &str) -> StateResult<StateSummary>;

    /// 最新的审计记录在前
    async fn get_audit_trail(&self, session_id: &str, limit: i64) -> StateResult<Vec<AuditEntry>>;

    async fn set_conversation_state(
        &self,
        session_id: &str,
        agent: &str,
        state: ConversationState,
    ) -> StateResult<SessionContext> {
        self.update_session_context(session_id, agent, SessionUpdate::conversation_state(state))
            .await
    }

    /// 将一轮结束后的共享状态写回存储
    async fn merge_state(
        &self,
        session_id: &str,
        state: &SharedState,
        agent: &str,
    ) -> StateResult<()> {
        let update = SessionUpdate {
            knowledge_base_id: state.knowledge_base_id.clone(),
            knowledge_base_name: state.knowledge_base_name.clone(),
            article_id: state.article_id.clone(),
            user_intent: state.user_intent.clone(),
            intent_confidence: state.intent_confidence.map(normalize_confidence),
            task_context: if state.task_context.is_empty() {
                None
            } else {
                Some(state.task_context.clone())
            },
            ..Default::default()
        };
        if !update.is_empty() {
            self.update_session_context(session_id, agent, update).await?;
        }

        self.update_agent_snapshot(session_id, agent, AgentSnapshot::from_state(state))
            .await
    }

    /// 根据持久化的会话构造一轮新的共享状态
    ///
    /// 递归计数归零，从UserProxy开始。
    async fn load_state(
        &self,
        session_id: &str,
        history: &[ConversationRecord],
    ) -> StateResult<SharedState> {
        let context = match self.get_session_context(session_id).await? {
            Some(context) => context,
            None => self.initialize_session(session_id, None).await?,
        };
        let snapshot = self
            .get_agent_snapshot(session_id)
            .await?
            .unwrap_or_default();

        let mut state = SharedState::new();
        state.messages = history
            .iter()
            .map(|record| ChatTurn {
                role: record.role.parse().unwrap_or(ChatRole::User),
                content: record.content.clone(),
            })
            .collect();
        state.agent_messages = snapshot.agent_messages;
        state.processed_messages = snapshot.processed_messages;
        state.consecutive_tool_calls = snapshot.consecutive_tool_calls;
        state.last_tool_result = snapshot.last_tool_result;

        state.knowledge_base_id = context.knowledge_base_id;
        state.knowledge_base_name = context.knowledge_base_name;
        state.article_id = context.article_id;
        state.user_intent = context.user_intent;
        state.intent_confidence = context.intent_confidence.map(|c| c * 100.0);
        state.task_context = context.task_context;

        state.current_agent = Some(AgentName::UserProxy);
        state.recursions = 0;
        Ok(state)
    }
}

/// 0-100 的置信度转换为 0.0-1.0
pub fn normalize_confidence(confidence: f64) -> f64 {
    let value = if confidence > 1.0 {
        confidence / 100.0
    } else {
        confidence
    };
    value.clamp(0.0, 1.0)
}

// Include tests
#[cfg(test)]
mod tests;
