//! ContentCreator：按计划撰写文章并写入知识库

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState,
    article_parser::parse_articles, prompts, truncate_chars,
};
use crate::knowledge_base::{NewArticle, render_hierarchy};

/// 计划在task_context中的键，修订时复用
const PLAN_KEY: &str = "content_plan";
const REVIEW_EXCERPT_CHARS: usize = 1500;

pub struct ContentCreator;

#[async_trait]
impl Agent for ContentCreator {
    fn name(&self) -> AgentName {
        AgentName::ContentCreator
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::ContentCreator);

        let Some(message) = state.take_latest(AgentName::ContentCreator) else {
            return Ok(());
        };

        let feedback = match message.message_type {
            MessageType::RevisionRequest => Some(message.content.clone()),
            _ => {
                state
                    .task_context
                    .insert(PLAN_KEY.to_string(), Value::String(message.content.clone()));
                None
            }
        };
        let plan = state
            .task_context
            .get(PLAN_KEY)
            .and_then(Value::as_str)
            .unwrap_or(&message.content)
            .to_string();

        let Some(kb_id) = message
            .meta_i64("kb_id")
            .or_else(|| state.knowledge_base_id_i64())
        else {
            bail!("no knowledge base selected for content creation");
        };
        let original_request = message
            .meta_str("original_request")
            .map(str::to_string)
            .or_else(|| state.last_user_input().map(str::to_string))
            .unwrap_or_default();

        let hierarchy = render_hierarchy(&ctx.knowledge_base.get_article_hierarchy(kb_id).await?);
        let draft = ctx
            .llm
            .complete(
                &ctx.system_prompt(prompts::CONTENT_CREATOR_PROMPT),
                &prompts::creation_request(&plan, &hierarchy, feedback.as_deref()),
            )
            .await?;

        let parsed = parse_articles(&draft);
        if parsed.is_empty() {
            warn!("⚠️ 未能从模型输出中解析出文章");
        }

        let mut titles = Vec::new();
        let mut ids = Vec::new();
        let mut excerpts = Vec::new();
        let mut tool_errors = 0i64;
        for article in parsed {
            match ctx
                .knowledge_base
                .insert_article(kb_id, NewArticle::new(&article.title, &article.content))
                .await
            {
                Ok(saved) => {
                    info!("📝 已写入文章: {} (ID: {})", saved.title, saved.id);
                    excerpts.push(format!(
                        "## {}\n{}",
                        saved.title,
                        truncate_chars(&saved.content, REVIEW_EXCERPT_CHARS)
                    ));
                    titles.push(saved.title);
                    ids.push(saved.id);
                }
                Err(e) => {
                    warn!("❌ 写入文章失败 {}: {}", article.title, e);
                    tool_errors += 1;
                }
            }
        }

        state.post(
            AgentMessage::new(
                AgentName::ContentCreator,
                AgentName::ContentReviewer,
                MessageType::ContentReviewRequest,
                excerpts.join("\n\n"),
            )
            .with("articles_created", titles.len() as i64)
            .with("article_titles", titles)
            .with("article_ids", ids)
            .with("tool_errors", tool_errors)
            .with("kb_id", kb_id)
            .with("original_request", original_request)
            .with(
                "intent",
                message.meta_str("intent").unwrap_or("create_content"),
            ),
        );
        state.current_agent = Some(AgentName::ContentReviewer);
        Ok(())
    }
}
