//! agent可调用的rig工具

use std::sync::{Arc, Mutex};

use schemars::JsonSchema;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{agents::AgentName, gitlab::GitLabClient, knowledge_base::KnowledgeBaseRepository};

pub mod gitlab;
pub mod knowledge_base;

pub use gitlab::{
    AgentToolCommentIssue, AgentToolCreateIssue, AgentToolCreateKbIssues, AgentToolListIssues,
    AgentToolListProjects, AgentToolRepositoryTree,
};
pub use knowledge_base::{
    AgentToolGetArticle, AgentToolHierarchy, AgentToolInsertArticle, AgentToolListKnowledgeBases,
    AgentToolSearchArticles, AgentToolSetArticleContext, AgentToolSetContext,
    AgentToolUpdateArticle,
};

/// 工具错误
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// 工具对上下文的修改，由调用方写回共享状态
#[derive(Debug, Clone, PartialEq)]
pub enum ContextChange {
    KnowledgeBase { id: i64, name: String },
    Article { knowledge_base_id: i64, article_id: i64 },
}

/// 一次工具调用的记录
#[derive(Debug, Clone)]
pub struct ToolEffect {
    pub tool: &'static str,
    pub summary: String,
    pub context: Option<ContextChange>,
}

/// 工具共享的服务与调用记录
#[derive(Clone)]
pub struct AgentToolbox {
    pub(crate) kb: Arc<dyn KnowledgeBaseRepository>,
    pub(crate) gitlab: Option<Arc<GitLabClient>>,
    pub(crate) default_project_id: Option<String>,
    pub(crate) agent: AgentName,
    effects: Arc<Mutex<Vec<ToolEffect>>>,
}

impl AgentToolbox {
    pub fn new(
        kb: Arc<dyn KnowledgeBaseRepository>,
        gitlab: Option<Arc<GitLabClient>>,
        default_project_id: Option<String>,
        agent: AgentName,
    ) -> Self {
        Self {
            kb,
            gitlab,
            default_project_id,
            agent,
            effects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn agent(&self) -> AgentName {
        self.agent
    }

    pub(crate) fn record(&self, tool: &'static str, summary: impl Into<String>, context: Option<ContextChange>) {
        if let Ok(mut effects) = self.effects.lock() {
            effects.push(ToolEffect {
                tool,
                summary: summary.into(),
                context,
            });
        }
    }

    /// 取出并清空调用记录
    pub fn take_effects(&self) -> Vec<ToolEffect> {
        self.effects
            .lock()
            .map(|mut effects| std::mem::take(&mut *effects))
            .unwrap_or_default()
    }

    pub fn effect_summaries(&self) -> Vec<String> {
        self.effects
            .lock()
            .map(|effects| {
                effects
                    .iter()
                    .map(|e| format!("{}: {}", e.tool, e.summary))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn gitlab_client(&self) -> Result<Arc<GitLabClient>, ToolError> {
        self.gitlab
            .clone()
            .ok_or_else(|| ToolError::new("GitLab not configured"))
    }

    pub(crate) fn project_id(&self, explicit: Option<String>) -> Result<String, ToolError> {
        explicit
            .or_else(|| self.default_project_id.clone())
            .ok_or_else(|| ToolError::new("No GitLab project id given and no default configured"))
    }
}

/// 由参数类型生成工具的JSON schema
pub(crate) fn parameters_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// 等待后台任务；工具逻辑跑在独立任务里，调用方的future只持有JoinHandle
pub(crate) async fn join<T>(handle: JoinHandle<Result<T, ToolError>>) -> Result<T, ToolError> {
    handle.await.map_err(ToolError::new)?
}

// Include tests
#[cfg(test)]
mod tests;
