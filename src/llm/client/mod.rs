//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::Result;
use async_trait::async_trait;
use rig::completion::PromptError;
use std::future::Future;
use tracing::{debug, warn};

use crate::{
    config::Config,
    llm::{ChatModel, client::utils::evaluate_befitting_model, tools::AgentToolbox},
};

mod providers;
pub mod utils;

use providers::ProviderClient;

/// LLM客户端 - 基于rig的provider实现
#[derive(Clone)]
pub struct LLMClient {
    config: Config,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: Config) -> Result<Self> {
        let client = ProviderClient::new(&config.llm)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        println!("🔄 正在检查模型连接...");
        match self.prompt("You are a helpful assistant.", "Hello").await {
            Ok(_) => {
                println!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                eprintln!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let llm_config = &self.config.llm;
        let max_retries = llm_config.retry_attempts.max(1);
        let retry_delay_ms = llm_config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    eprintln!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    /// 单轮对话（不使用工具）
    pub async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config.llm, system_prompt, user_prompt);

        self.prompt_inner(system_prompt, user_prompt, befitting_model, fallover_model)
            .await
    }

    async fn prompt_inner(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<String> {
        let llm_config = &self.config.llm;
        let agent = self
            .client
            .create_agent(&befitting_model, system_prompt, llm_config);

        match self
            .retry_with_backoff(|| async { agent.prompt(user_prompt).await })
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) => match fallover_model {
                Some(model) => {
                    eprintln!(
                        "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                        llm_config.retry_attempts, model, e
                    );
                    Box::pin(self.prompt_inner(system_prompt, user_prompt, model, None)).await
                }
                None => Err(e),
            },
        }
    }

    /// 单次调用，失败直接返回错误
    pub async fn prompt_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, _) =
            evaluate_befitting_model(&self.config.llm, system_prompt, user_prompt);
        let agent = self
            .client
            .create_agent(&befitting_model, system_prompt, &self.config.llm);
        agent.prompt(user_prompt).await
    }

    /// 允许模型调用工具的多轮对话
    ///
    /// 达到最大工具轮次时退回到不带工具的单轮对话。
    pub async fn prompt_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        toolbox: &AgentToolbox,
    ) -> Result<String> {
        let llm_config = &self.config.llm;
        let (befitting_model, _) =
            evaluate_befitting_model(llm_config, system_prompt, user_prompt);
        let agent = self.client.create_agent_with_tools(
            &befitting_model,
            system_prompt,
            llm_config,
            toolbox,
        );

        let outcome = self
            .retry_with_backoff(|| async {
                match agent.multi_turn(user_prompt, llm_config.max_tool_turns).await {
                    Ok(reply) => Ok(Some(reply)),
                    Err(PromptError::MaxDepthError { max_depth, .. }) => {
                        warn!("工具调用达到最大轮次 {}", max_depth);
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        match outcome {
            Some(reply) => Ok(reply),
            None => {
                let effects = toolbox.effect_summaries();
                debug!("已执行的工具: {:?}", effects);
                let user_prompt = format!(
                    "{}\n\nTool results so far:\n{}\n\nAnswer now without calling more tools.",
                    user_prompt,
                    effects.join("\n")
                );
                self.prompt(system_prompt, &user_prompt).await
            }
        }
    }
}

#[async_trait]
impl ChatModel for LLMClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompt(system_prompt, user_prompt).await
    }

    async fn complete_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompt_once(system_prompt, user_prompt).await
    }

    async fn complete_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        toolbox: &AgentToolbox,
    ) -> Result<String> {
        self.prompt_with_tools(system_prompt, user_prompt, toolbox)
            .await
    }
}
