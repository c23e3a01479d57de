//! LLM Provider支持模块

use anyhow::Result;
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Prompt, PromptError},
};

use crate::{
    config::{LLMConfig, LLMProvider},
    llm::tools::{
        AgentToolbox, AgentToolCommentIssue, AgentToolCreateIssue, AgentToolCreateKbIssues,
        AgentToolGetArticle, AgentToolHierarchy, AgentToolInsertArticle, AgentToolListIssues,
        AgentToolListKnowledgeBases, AgentToolListProjects, AgentToolRepositoryTree,
        AgentToolSearchArticles, AgentToolSetArticleContext, AgentToolSetContext,
        AgentToolUpdateArticle,
    },
};

/// 统一的Provider客户端枚举
#[derive(Clone)]
pub enum ProviderClient {
    /// OpenAI以及Azure OpenAI（v1兼容端点）
    OpenAI(rig::providers::openai::Client),
    DeepSeek(rig::providers::deepseek::Client),
    Anthropic(rig::providers::anthropic::Client),
    Ollama(rig::providers::ollama::Client),
}

/// 为agent builder挂上全部工具
macro_rules! with_agent_tools {
    ($builder:expr, $toolbox:expr) => {
        $builder
            .tool(AgentToolListKnowledgeBases::new($toolbox.clone()))
            .tool(AgentToolSetContext::new($toolbox.clone()))
            .tool(AgentToolSetArticleContext::new($toolbox.clone()))
            .tool(AgentToolHierarchy::new($toolbox.clone()))
            .tool(AgentToolGetArticle::new($toolbox.clone()))
            .tool(AgentToolInsertArticle::new($toolbox.clone()))
            .tool(AgentToolUpdateArticle::new($toolbox.clone()))
            .tool(AgentToolSearchArticles::new($toolbox.clone()))
            .tool(AgentToolListProjects::new($toolbox.clone()))
            .tool(AgentToolListIssues::new($toolbox.clone()))
            .tool(AgentToolCreateIssue::new($toolbox.clone()))
            .tool(AgentToolCommentIssue::new($toolbox.clone()))
            .tool(AgentToolCreateKbIssues::new($toolbox.clone()))
            .tool(AgentToolRepositoryTree::new($toolbox.clone()))
    };
}

impl ProviderClient {
    /// 根据配置创建相应的provider客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        match config.provider {
            LLMProvider::OpenAI | LLMProvider::Azure => {
                let client = rig::providers::openai::Client::builder(&config.api_key)
                    .base_url(&config.effective_base_url())
                    .build();
                Ok(ProviderClient::OpenAI(client))
            }
            LLMProvider::DeepSeek => {
                let client = rig::providers::deepseek::Client::builder(&config.api_key)
                    .base_url(&config.api_base_url)
                    .build();
                Ok(ProviderClient::DeepSeek(client))
            }
            LLMProvider::Anthropic => {
                let client =
                    rig::providers::anthropic::ClientBuilder::new(&config.api_key).build()?;
                Ok(ProviderClient::Anthropic(client))
            }
            LLMProvider::Ollama => {
                let client = rig::providers::ollama::Client::builder().build();
                Ok(ProviderClient::Ollama(client))
            }
        }
    }

    /// 创建不带工具的Agent
    pub fn create_agent(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
    ) -> ProviderAgent {
        match self {
            ProviderClient::OpenAI(client) => {
                let agent = client
                    .completion_model(model)
                    .completions_api()
                    .into_agent_builder()
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature)
                    .build();
                ProviderAgent::OpenAI(agent)
            }
            ProviderClient::DeepSeek(client) => {
                let agent = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature)
                    .build();
                ProviderAgent::DeepSeek(agent)
            }
            ProviderClient::Anthropic(client) => {
                let agent = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature)
                    .build();
                ProviderAgent::Anthropic(agent)
            }
            ProviderClient::Ollama(client) => {
                let agent = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature)
                    .build();
                ProviderAgent::Ollama(agent)
            }
        }
    }

    /// 创建带知识库与GitLab工具的Agent
    pub fn create_agent_with_tools(
        &self,
        model: &str,
        system_prompt: &str,
        config: &LLMConfig,
        toolbox: &AgentToolbox,
    ) -> ProviderAgent {
        match self {
            ProviderClient::OpenAI(client) => {
                let builder = client
                    .completion_model(model)
                    .completions_api()
                    .into_agent_builder()
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature);
                ProviderAgent::OpenAI(with_agent_tools!(builder, toolbox).build())
            }
            ProviderClient::DeepSeek(client) => {
                let builder = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature);
                ProviderAgent::DeepSeek(with_agent_tools!(builder, toolbox).build())
            }
            ProviderClient::Anthropic(client) => {
                let builder = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature);
                ProviderAgent::Anthropic(with_agent_tools!(builder, toolbox).build())
            }
            ProviderClient::Ollama(client) => {
                let builder = client
                    .agent(model)
                    .preamble(system_prompt)
                    .max_tokens(config.max_tokens.into())
                    .temperature(config.temperature);
                ProviderAgent::Ollama(with_agent_tools!(builder, toolbox).build())
            }
        }
    }
}

/// 统一的Agent枚举
pub enum ProviderAgent {
    OpenAI(Agent<rig::providers::openai::CompletionModel>),
    DeepSeek(Agent<rig::providers::deepseek::CompletionModel>),
    Anthropic(Agent<rig::providers::anthropic::completion::CompletionModel>),
    Ollama(Agent<rig::providers::ollama::CompletionModel<reqwest::Client>>),
}

impl ProviderAgent {
    /// 执行prompt
    pub async fn prompt(&self, prompt: &str) -> Result<String> {
        match self {
            ProviderAgent::OpenAI(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::DeepSeek(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Anthropic(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
            ProviderAgent::Ollama(agent) => agent.prompt(prompt).await.map_err(|e| e.into()),
        }
    }

    /// 执行多轮（工具调用）对话
    pub async fn multi_turn(
        &self,
        prompt: &str,
        max_iterations: usize,
    ) -> Result<String, PromptError> {
        match self {
            ProviderAgent::OpenAI(agent) => agent.prompt(prompt).multi_turn(max_iterations).await,
            ProviderAgent::DeepSeek(agent) => agent.prompt(prompt).multi_turn(max_iterations).await,
            ProviderAgent::Anthropic(agent) => {
                agent.prompt(prompt).multi_turn(max_iterations).await
            }
            ProviderAgent::Ollama(agent) => agent.prompt(prompt).multi_turn(max_iterations).await,
        }
    }
}
