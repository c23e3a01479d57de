//! 基于PostgreSQL的会话存储
//!
//! 上下文与快照以JSONB保存；读改写在事务中通过 `SELECT ... FOR UPDATE` 锁行。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    AgentSnapshot, AuditEntry, ChangeType, ConversationRecord, SessionContext, SessionStore,
    SessionUpdate, StateResult, StateSummary, conversation_audit_value,
};
use crate::error::StateError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS session_states (
    session_id              VARCHAR(255) PRIMARY KEY,
    session_context         JSONB NOT NULL DEFAULT '{}',
    agent_context           JSONB NOT NULL DEFAULT '{}',
    conversation_metadata   JSONB NOT NULL DEFAULT '{}',
    is_active               BOOLEAN NOT NULL DEFAULT TRUE,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at              TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS conversation_messages (
    id                  BIGSERIAL PRIMARY KEY,
    session_id          VARCHAR(255) NOT NULL REFERENCES session_states(session_id) ON DELETE CASCADE,
    message_role        VARCHAR(50) NOT NULL,
    message_content     TEXT NOT NULL,
    message_metadata    JSONB NOT NULL DEFAULT '{}',
    agent_name          VARCHAR(100),
    tool_calls          JSONB NOT NULL DEFAULT '[]',
    message_order       INTEGER NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS state_audit_log (
    id                  BIGSERIAL PRIMARY KEY,
    session_id          VARCHAR(255) NOT NULL REFERENCES session_states(session_id) ON DELETE CASCADE,
    change_type         VARCHAR(50) NOT NULL,
    change_path         VARCHAR(255) NOT NULL,
    old_value           JSONB,
    new_value           JSONB,
    agent_name          VARCHAR(100),
    change_timestamp    TIMESTAMPTZ NOT NULL DEFAULT now(),
    correlation_id      UUID
);

CREATE INDEX IF NOT EXISTS idx_session_states_active ON session_states(is_active, updated_at);
CREATE INDEX IF NOT EXISTS idx_conversation_messages_session ON conversation_messages(session_id, message_order);
CREATE INDEX IF NOT EXISTS idx_state_audit_session ON state_audit_log(session_id, change_timestamp);
CREATE INDEX IF NOT EXISTS idx_session_context_gin ON session_states USING GIN (session_context);

CREATE OR REPLACE FUNCTION update_session_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS trigger_update_session_timestamp ON session_states;
CREATE TRIGGER trigger_update_session_timestamp
    BEFORE UPDATE ON session_states
    FOR EACH ROW EXECUTE FUNCTION update_session_updated_at();
"#;

/// PostgreSQL会话存储
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn audit(
        tx: &mut Transaction<'_, Postgres>,
        session_id: &str,
        entry: &AuditEntry,
    ) -> StateResult<()> {
        sqlx::query(
            "INSERT INTO state_audit_log \
             (session_id, change_type, change_path, old_value, new_value, agent_name, correlation_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(session_id)
        .bind(entry.change_type.as_str())
        .bind(&entry.change_path)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.agent_name)
        .bind(entry.correlation_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        session_id: &str,
    ) -> StateResult<(Value, Value)> {
        let row: Option<(Value, Value)> = sqlx::query_as(
            "SELECT session_context, agent_context FROM session_states \
             WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.ok_or_else(|| StateError::NotFound(session_id.to_string()))
    }
}

/// agent_context 为空对象时视为默认快照
fn decode_snapshot(value: Value) -> StateResult<AgentSnapshot> {
    if value.as_object().is_none_or(|obj| obj.is_empty()) {
        return Ok(AgentSnapshot::default());
    }
    Ok(serde_json::from_value(value)?)
}

fn decode_context(session_id: &str, value: Value) -> StateResult<SessionContext> {
    if value.as_object().is_none_or(|obj| obj.is_empty()) {
        return Ok(SessionContext::new(session_id));
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl SessionStore for PostgresStateStore {
    async fn ensure_schema(&self) -> StateResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn initialize_session(
        &self,
        session_id: &str,
        knowledge_base_id: Option<String>,
    ) -> StateResult<SessionContext> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(Value,)> = sqlx::query_as(
            "SELECT session_context FROM session_states WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((value,)) = existing {
            sqlx::query("UPDATE session_states SET is_active = TRUE WHERE session_id = $1")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return decode_context(session_id, value);
        }

        let mut context = SessionContext::new(session_id);
        context.knowledge_base_id = knowledge_base_id;
        context.validate()?;

        sqlx::query(
            "INSERT INTO session_states (session_id, session_context, agent_context) \
             VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(serde_json::to_value(&context)?)
        .bind(serde_json::to_value(AgentSnapshot::default())?)
        .execute(&mut *tx)
        .await?;

        let entry = AuditEntry::new(
            ChangeType::Create,
            "session",
            None,
            Some(json!({ "session_id": session_id })),
            "System",
            Uuid::new_v4(),
        );
        Self::audit(&mut tx, session_id, &entry).await?;
        tx.commit().await?;
        Ok(context)
    }

    async fn get_session_context(&self, session_id: &str) -> StateResult<Option<SessionContext>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT session_context FROM session_states WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(value,)| decode_context(session_id, value))
            .transpose()
    }

    async fn update_session_context(
        &self,
        session_id: &str,
        agent: &str,
        update: SessionUpdate,
    ) -> StateResult<SessionContext> {
        let mut tx = self.pool.begin().await?;
        let (context_value, _) = Self::lock_row(&mut tx, session_id).await?;
        let mut context = decode_context(session_id, context_value)?;

        let changes = update.apply(&mut context);
        context.validate()?;

        if !changes.is_empty() {
            sqlx::query("UPDATE session_states SET session_context = $2 WHERE session_id = $1")
                .bind(session_id)
                .bind(serde_json::to_value(&context)?)
                .execute(&mut *tx)
                .await?;

            let correlation_id = Uuid::new_v4();
            for change in changes {
                let entry = AuditEntry::new(
                    ChangeType::Update,
                    change.path,
                    Some(change.old_value),
                    Some(change.new_value),
                    agent,
                    correlation_id,
                );
                Self::audit(&mut tx, session_id, &entry).await?;
            }
        }

        tx.commit().await?;
        Ok(context)
    }

    async fn get_agent_snapshot(&self, session_id: &str) -> StateResult<Option<AgentSnapshot>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT agent_context FROM session_states WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(value,)| decode_snapshot(value)).transpose()
    }

    async fn update_agent_snapshot(
        &self,
        session_id: &str,
        agent: &str,
        mut snapshot: AgentSnapshot,
    ) -> StateResult<()> {
        let mut tx = self.pool.begin().await?;
        let (_, agent_value) = Self::lock_row(&mut tx, session_id).await?;
        let previous = decode_snapshot(agent_value)?;

        if previous.current_agent != snapshot.current_agent {
            snapshot.last_agent_switch = Some(Utc::now());
            let entry = AuditEntry::new(
                ChangeType::AgentSwitch,
                "agent.current_agent",
                Some(json!(previous.current_agent)),
                Some(json!(snapshot.current_agent)),
                agent,
                Uuid::new_v4(),
            );
            Self::audit(&mut tx, session_id, &entry).await?;
        } else {
            snapshot.last_agent_switch = previous.last_agent_switch;
        }

        sqlx::query("UPDATE session_states SET agent_context = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(serde_json::to_value(&snapshot)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        // 锁住会话行，保证序号分配不冲突
        Self::lock_row(&mut tx, session_id).await?;

        let (order,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(message_order), 0) + 1 FROM conversation_messages \
             WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO conversation_messages \
             (session_id, message_role, message_content, message_metadata, agent_name, message_order) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(&metadata)
        .bind(agent)
        .bind(order)
        .execute(&mut *tx)
        .await?;

        let entry = AuditEntry::new(
            ChangeType::ConversationUpdate,
            "conversation.message",
            None,
            Some(conversation_audit_value(role, content)),
            agent.unwrap_or("System"),
            Uuid::new_v4(),
        );
        Self::audit(&mut tx, session_id, &entry).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_conversation_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> StateResult<Vec<ConversationRecord>> {
        let rows: Vec<(String, String, Option<String>, Value, i32, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT message_role, message_content, agent_name, message_metadata, \
                        message_order, created_at \
                 FROM conversation_messages WHERE session_id = $1 \
                 ORDER BY message_order DESC LIMIT $2",
            )
            .bind(session_id)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .rev()
            .map(
                |(role, content, agent_name, metadata, order, created_at)| ConversationRecord {
                    role,
                    content,
                    agent_name,
                    metadata,
                    order,
                    created_at,
                },
            )
            .collect())
    }

    async fn set_active(&self, session_id: &str, active: bool) -> StateResult<()> {
        let result = sqlx::query("UPDATE session_states SET is_active = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> StateResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT session_id FROM session_states WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Ok(());
        }

        let entry = AuditEntry::new(
            ChangeType::Delete,
            "session",
            Some(json!({ "session_id": session_id })),
            None,
            "System",
            Uuid::new_v4(),
        );
        Self::audit(&mut tx, session_id, &entry).await?;

        sqlx::query("DELETE FROM conversation_messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE session_states \
             SET is_active = FALSE, session_context = $2, agent_context = $3 \
             WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(serde_json::to_value(SessionContext::new(session_id))?)
        .bind(serde_json::to_value(AgentSnapshot::default())?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_state_summary(&self, session_id: &str) -> StateResult<StateSummary> {
        let state_row: Option<(Value, Value, DateTime<Utc>, DateTime<Utc>, bool)> =
            sqlx::query_as(
                "SELECT session_context, agent_context, created_at, updated_at, is_active \
                 FROM session_states WHERE session_id = $1",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let (message_count, first_message, last_message): (
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), MIN(created_at), MAX(created_at) \
             FROM conversation_messages WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let (change_count, last_change): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT COUNT(*), MAX(change_timestamp) FROM state_audit_log WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let (session_context, agent_snapshot, created_at, updated_at, is_active) = match state_row
        {
            Some((context, snapshot, created_at, updated_at, is_active)) => (
                Some(decode_context(session_id, context)?),
                Some(decode_snapshot(snapshot)?),
                Some(created_at),
                Some(updated_at),
                is_active,
            ),
            None => (None, None, None, None, false),
        };

        Ok(StateSummary {
            session_id: session_id.to_string(),
            is_active,
            session_context,
            agent_snapshot,
            created_at,
            updated_at,
            message_count,
            first_message,
            last_message,
            change_count,
            last_change,
        })
    }

    async fn get_audit_trail(&self, session_id: &str, limit: i64) -> StateResult<Vec<AuditEntry>> {
        let rows: Vec<(
            String,
            String,
            Option<Value>,
            Option<Value>,
            Option<String>,
            DateTime<Utc>,
            Option<Uuid>,
        )> = sqlx::query_as(
            "SELECT change_type, change_path, old_value, new_value, agent_name, \
                    change_timestamp, correlation_id \
             FROM state_audit_log WHERE session_id = $1 \
             ORDER BY change_timestamp DESC, id DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(change_type, change_path, old_value, new_value, agent_name, timestamp, correlation_id)| {
                    let change_type = change_type
                        .parse::<ChangeType>()
                        .map_err(StateError::Validation)?;
                    Ok(AuditEntry {
                        change_type,
                        change_path,
                        old_value,
                        new_value,
                        agent_name,
                        timestamp,
                        correlation_id,
                    })
                },
            )
            .collect()
    }
}
