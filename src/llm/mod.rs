//! LLM接入层

use anyhow::Result;
use async_trait::async_trait;

pub mod client;
pub mod scripted;
pub mod tools;

pub use client::LLMClient;
pub use scripted::ScriptedModel;
pub use tools::AgentToolbox;

/// agent使用的对话模型
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 单轮对话，不使用工具
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// 只尝试一次，不重试也不切换备选模型
    async fn complete_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete(system_prompt, user_prompt).await
    }

    /// 允许模型调用知识库/GitLab工具的多轮对话
    ///
    /// 工具产生的副作用记录在 `toolbox` 中，由调用方读取。
    async fn complete_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        toolbox: &AgentToolbox,
    ) -> Result<String> {
        let _ = toolbox;
        self.complete(system_prompt, user_prompt).await
    }
}
