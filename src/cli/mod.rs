use crate::config::{ClassifierStrategy, Config, DEFAULT_CONFIG_FILE, LLMProvider};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

pub use commands::{ChatCommand, run};

/// kb-agents - 多agent协作的知识库内容引擎
#[derive(Parser, Debug)]
#[command(name = "kb-agents")]
#[command(
    about = "Multi-agent knowledge base engine: a router classifies your intent, a supervisor coordinates planning, writing, review and content management agents, and GitLab issues act as the shared work queue."
)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// PostgreSQL连接串
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// 使用进程内存储，不连接数据库
    #[arg(long, global = true)]
    pub memory: bool,

    /// LLM Provider (openai, azure, deepseek, anthropic, ollama)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long, global = true)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long, global = true)]
    pub llm_api_base_url: Option<String>,

    /// 常规推理使用的模型
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// 兜底模型，不指定时与 `--model` 相同
    #[arg(long, global = true)]
    pub model_powerful: Option<String>,

    /// 意图分类策略 (llm, keyword)
    #[arg(long, global = true)]
    pub classifier: Option<String>,

    /// 单轮对话的agent步数上限
    #[arg(long, global = true)]
    pub max_recursions: Option<u32>,

    /// GitLab默认项目（id或 group/project）
    #[arg(long, global = true)]
    pub gitlab_project: Option<String>,

    /// 是否启用详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 交互式多agent对话（默认）
    Chat {
        /// 继续已有的会话
        #[arg(long)]
        session_id: Option<String>,
    },
    /// 自治swarm：各agent从GitLab发现并处理工作
    Swarm {
        /// 只执行一轮后退出
        #[arg(long)]
        once: bool,
    },
    /// 查看或清理会话
    Session {
        #[command(subcommand)]
        action: SessionAction,

        #[arg(long, global = true)]
        session_id: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// 会话摘要
    Summary,
    /// 审计日志
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// 删除对话记录并停用会话
    Clear,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Chat { session_id: None })
    }

    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("无法读取配置文件 {:?}", path))?,
            None => {
                let default_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Config::from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };

        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(provider_str) = self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用默认provider",
                    provider_str
                ),
            }
        }
        if let Some(key) = self.llm_api_key {
            config.llm.api_key = key;
        }
        if let Some(base_url) = self.llm_api_base_url {
            config.llm.api_base_url = base_url;
        }
        if let Some(model) = self.model {
            config.llm.model_powerful = self.model_powerful.unwrap_or_else(|| model.clone());
            config.llm.model_efficient = model;
        } else if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(classifier) = self.classifier {
            config.orchestrator.classifier = classifier
                .parse::<ClassifierStrategy>()
                .map_err(anyhow::Error::msg)?;
        }
        if let Some(max_recursions) = self.max_recursions {
            config.orchestrator.max_recursions = max_recursions;
        }
        if let Some(project) = self.gitlab_project {
            config.gitlab.default_project_id = Some(project);
        }

        config.in_memory |= self.memory;
        config.verbose |= self.verbose;
        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
