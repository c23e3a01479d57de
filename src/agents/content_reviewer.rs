//! ContentReviewer：评审新写的文章，必要时退回修改

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState, prompts};

const REVISION_INDICATORS: [&str; 7] = [
    "needs improvement",
    "requires revision",
    "gaps identified",
    "quality issues",
    "incomplete coverage",
    "not ready for publication",
    "revisions needed",
];

const IMPROVEMENT_AREAS: [&str; 4] = ["depth", "coverage", "organization", "quality"];

pub fn requests_revision(review: &str) -> bool {
    let lowered = review.to_lowercase();
    REVISION_INDICATORS.iter().any(|i| lowered.contains(i))
}

/// 评审中提到的改进方向
pub fn improvement_areas(review: &str) -> Vec<String> {
    let lowered = review.to_lowercase();
    IMPROVEMENT_AREAS
        .iter()
        .filter(|area| lowered.contains(*area))
        .map(|area| area.to_string())
        .collect()
}

pub struct ContentReviewer;

#[async_trait]
impl Agent for ContentReviewer {
    fn name(&self) -> AgentName {
        AgentName::ContentReviewer
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::ContentReviewer);

        let Some(message) = state.take_latest(AgentName::ContentReviewer) else {
            return Ok(());
        };

        let created = message.meta_i64("articles_created").unwrap_or(0);
        let titles: Vec<String> = message
            .metadata
            .get("article_titles")
            .and_then(Value::as_array)
            .map(|titles| {
                titles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let kb_id = message
            .meta_i64("kb_id")
            .or_else(|| state.knowledge_base_id_i64());
        let kb_label = match (kb_id, &state.knowledge_base_name) {
            (Some(id), Some(name)) => format!("{} (ID: {})", name, id),
            (Some(id), None) => format!("knowledge base {}", id),
            _ => "the knowledge base".to_string(),
        };
        let summary = if titles.is_empty() {
            format!("Created {} articles in {}.", created, kb_label)
        } else {
            format!(
                "Created {} articles in {}: {}",
                created,
                kb_label,
                titles.join(", ")
            )
        };

        let review = ctx
            .llm
            .complete(
                &ctx.system_prompt(prompts::CONTENT_REVIEWER_PROMPT),
                &prompts::review_request(&summary, &message.content),
            )
            .await?;
        let review = review.trim().to_string();
        let wants_revision = requests_revision(&review);
        let original_request = message
            .meta_str("original_request")
            .unwrap_or_default()
            .to_string();

        if wants_revision && state.revision_count < ctx.config.orchestrator.max_revisions {
            state.revision_count += 1;
            info!("🔁 ContentReviewer要求修改 (第 {} 次)", state.revision_count);
            let mut revision = AgentMessage::new(
                AgentName::ContentReviewer,
                AgentName::ContentCreator,
                MessageType::RevisionRequest,
                review,
            )
            .with("original_request", original_request)
            .with("intent", "create_content");
            if let Some(kb_id) = kb_id {
                revision = revision.with("kb_id", kb_id);
            }
            state.post(revision);
            state.current_agent = Some(AgentName::ContentCreator);
            return Ok(());
        }

        info!("✅ ContentReviewer通过 {} 篇文章", created);
        state.post(
            AgentMessage::new(
                AgentName::ContentReviewer,
                AgentName::UserProxy,
                MessageType::WorkflowComplete,
                format!("{}\n\nReview:\n{}", summary, review),
            )
            .with("intent", "create_content")
            .with("articles_created", created)
            .with(
                "overall_quality",
                if wants_revision { "good" } else { "high" },
            )
            .with("improvement_areas", improvement_areas(&review)),
        );
        state.current_agent = Some(AgentName::UserProxy);
        Ok(())
    }
}
