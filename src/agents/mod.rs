//! 多agent协作：共享状态、agent实现与意图分类

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    config::Config, gitlab::GitLabClient, knowledge_base::KnowledgeBaseRepository,
    llm::{AgentToolbox, ChatModel},
};

pub mod article_parser;
pub mod content_creator;
pub mod content_management;
pub mod content_planner;
pub mod content_reviewer;
pub mod prompts;
pub mod router;
mod state;
pub mod supervisor;
mod types;
pub mod user_proxy;

pub use content_creator::ContentCreator;
pub use content_management::ContentManagement;
pub use content_planner::ContentPlanner;
pub use content_reviewer::ContentReviewer;
pub use router::Router;
pub use state::{SharedState, detect_loop};
pub use supervisor::Supervisor;
pub use types::{AgentMessage, AgentName, ChatRole, ChatTurn, MessageType};
pub use user_proxy::UserProxy;

/// 图中的一个节点
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> AgentName;

    /// 处理一步；通过 `state.current_agent` 指定下一个节点
    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()>;
}

/// agent共享的服务
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn ChatModel>,
    pub knowledge_base: Arc<dyn KnowledgeBaseRepository>,
    pub gitlab: Option<Arc<GitLabClient>>,
    pub config: Arc<Config>,
}

impl AgentContext {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        knowledge_base: Arc<dyn KnowledgeBaseRepository>,
        gitlab: Option<Arc<GitLabClient>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            llm,
            knowledge_base,
            gitlab,
            config,
        }
    }

    /// 每个agent开始处理时调用：递增计数并做循环检测
    pub fn begin_step(&self, state: &mut SharedState, agent: AgentName) {
        let orchestrator = &self.config.orchestrator;
        let looped = state.increment_recursions(
            agent,
            orchestrator.loop_window,
            orchestrator.sequence_capacity,
        );
        debug!("🔄 {} (第 {} 步)", agent, state.recursions);
        if looped {
            warn!(
                "⚠️ 检测到agent循环: {:?}",
                state.agent_sequence.iter().map(AgentName::as_str).collect::<Vec<_>>()
            );
        }
    }

    /// 带当前时间前缀的系统提示词
    pub fn system_prompt(&self, body: &str) -> String {
        format!(
            "Current date and time: {}\n\n{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            body
        )
    }

    pub fn toolbox(&self, agent: AgentName) -> AgentToolbox {
        AgentToolbox::new(
            self.knowledge_base.clone(),
            self.gitlab.clone(),
            self.config.gitlab.default_project_id.clone(),
            agent,
        )
    }
}

/// 截断到指定字符数
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support;
