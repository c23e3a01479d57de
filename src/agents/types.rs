//! agent名称、消息信封与对话轮次

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 图中的agent节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentName {
    UserProxy,
    Router,
    Supervisor,
    ContentPlanner,
    ContentCreator,
    ContentReviewer,
    ContentManagement,
}

impl AgentName {
    pub const ALL: [AgentName; 7] = [
        AgentName::UserProxy,
        AgentName::Router,
        AgentName::Supervisor,
        AgentName::ContentPlanner,
        AgentName::ContentCreator,
        AgentName::ContentReviewer,
        AgentName::ContentManagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::UserProxy => "UserProxy",
            AgentName::Router => "Router",
            AgentName::Supervisor => "Supervisor",
            AgentName::ContentPlanner => "ContentPlanner",
            AgentName::ContentCreator => "ContentCreator",
            AgentName::ContentReviewer => "ContentReviewer",
            AgentName::ContentManagement => "ContentManagement",
        }
    }

    /// 角色说明，用于 `/agents` 与系统提示词
    pub fn role(&self) -> &'static str {
        match self {
            AgentName::UserProxy => "Talks to the user and presents the final answer",
            AgentName::Router => "Classifies user intent and routes the request",
            AgentName::Supervisor => "Coordinates work and reviews results before they reach the user",
            AgentName::ContentPlanner => "Plans knowledge base structure and analyzes content gaps",
            AgentName::ContentCreator => "Writes articles for the knowledge base",
            AgentName::ContentReviewer => "Reviews created content for quality and completeness",
            AgentName::ContentManagement => "Executes knowledge base operations with tools",
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::ALL
            .into_iter()
            .find(|agent| agent.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown agent: {}", s))
    }
}

/// 信封类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    WorkRequest,
    DirectResponseRequest,
    SupervisedWorkRequest,
    WorkflowResponse,
    WorkflowComplete,
    WorkflowError,
    RevisionRequest,
    StatusUpdate,
    InfoResponse,
    ClarificationRequest,
    ContentCreationPlan,
    ContentReviewRequest,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::WorkRequest => "work_request",
            MessageType::DirectResponseRequest => "direct_response_request",
            MessageType::SupervisedWorkRequest => "supervised_work_request",
            MessageType::WorkflowResponse => "workflow_response",
            MessageType::WorkflowComplete => "workflow_complete",
            MessageType::WorkflowError => "workflow_error",
            MessageType::RevisionRequest => "revision_request",
            MessageType::StatusUpdate => "status_update",
            MessageType::InfoResponse => "info_response",
            MessageType::ClarificationRequest => "clarification_request",
            MessageType::ContentCreationPlan => "content_creation_plan",
            MessageType::ContentReviewRequest => "content_review_request",
            MessageType::Other(other) => other,
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "work_request" => MessageType::WorkRequest,
            "direct_response_request" => MessageType::DirectResponseRequest,
            "supervised_work_request" => MessageType::SupervisedWorkRequest,
            "workflow_response" => MessageType::WorkflowResponse,
            "workflow_complete" => MessageType::WorkflowComplete,
            "workflow_error" => MessageType::WorkflowError,
            "revision_request" => MessageType::RevisionRequest,
            "status_update" => MessageType::StatusUpdate,
            "info_response" => MessageType::InfoResponse,
            "clarification_request" => MessageType::ClarificationRequest,
            "content_creation_plan" => MessageType::ContentCreationPlan,
            "content_review_request" => MessageType::ContentReviewRequest,
            _ => MessageType::Other(value),
        }
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// agent之间传递的消息信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub id: Uuid,
    pub sender: AgentName,
    pub recipient: AgentName,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        sender: AgentName,
        recipient: AgentName,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            message_type,
            content: content.into(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// 追加一条元数据
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn meta_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(Value::as_bool)
    }

    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }
}

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(ChatRole::User),
            "assistant" | "ai" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// 一条对话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
