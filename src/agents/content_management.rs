//! ContentManagement：执行知识库操作

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{
    Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState, prompts,
    truncate_chars,
};
use crate::{
    knowledge_base::render_hierarchy,
    llm::tools::{ContextChange, ToolEffect},
};

/// 连续工具调用达到该次数时在提示词中追加警告
const TOOL_CALL_WARNING_THRESHOLD: u32 = 3;
const LAST_TOOL_RESULT_CHARS: usize = 500;

static KB_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)kb\s+(\d+)",
        r"(?i)use\s+kb\s+(\d+)",
        r"(?i)switch\s+to\s+kb\s+(\d+)",
        r"(?i)set\s+kb\s+(\d+)",
        r"(?i)knowledge\s+base\s+(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ARTICLE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)article\s+(\d+)").unwrap());

static SEARCH_TERM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:about|for|on|containing|regarding|mentioning|under|in)\s+(.+)$").unwrap()
});

/// 从请求中提取知识库id
pub fn extract_kb_id(text: &str) -> Option<i64> {
    KB_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn extract_article_id(text: &str) -> Option<i64> {
    ARTICLE_ID_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 从检索请求中提取查询词
pub fn extract_search_term(text: &str) -> String {
    let term = SEARCH_TERM_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    term.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '?' || c == '.')
        .trim()
        .to_string()
}

/// 一次工作的结果
#[derive(Debug, Clone, Default)]
struct WorkOutcome {
    success: bool,
    content: String,
    results: Value,
    retrieved_count: i64,
    tool_errors: i64,
    tool_executed: bool,
}

impl WorkOutcome {
    fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            results: Value::Null,
            ..Default::default()
        }
    }

    fn failed(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
            results: Value::Null,
            ..Default::default()
        }
    }
}

pub struct ContentManagement;

impl ContentManagement {
    async fn execute(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        intent: &str,
        request: &str,
    ) -> Result<WorkOutcome> {
        match intent {
            "set_knowledge_base_context" => match extract_kb_id(request) {
                Some(id) => self.set_knowledge_base(state, ctx, id).await,
                None => self.with_tools(state, ctx, intent, request).await,
            },
            "set_article_context" => match extract_article_id(request) {
                Some(id) => self.set_article(state, ctx, id).await,
                None => self.with_tools(state, ctx, intent, request).await,
            },
            "retrieve_content" => self.retrieve(state, ctx, request).await,
            "retrieve_filtered_content" | "search_content" => {
                self.search(state, ctx, request).await
            }
            _ => self.with_tools(state, ctx, intent, request).await,
        }
    }

    async fn set_knowledge_base(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        id: i64,
    ) -> Result<WorkOutcome> {
        state.consecutive_tool_calls = 0;
        match ctx.knowledge_base.get_knowledge_base_by_id(id).await? {
            Some(kb) => {
                state.knowledge_base_id = Some(kb.id.to_string());
                state.knowledge_base_name = Some(kb.name.clone());
                state.article_id = None;
                let mut outcome = WorkOutcome::ok(format!(
                    "Knowledge base context set to: {} (ID: {})",
                    kb.name, kb.id
                ));
                outcome.results = json!({ "knowledge_base_id": kb.id, "name": kb.name });
                Ok(outcome)
            }
            None => Ok(WorkOutcome::failed(format!(
                "Knowledge base {} was not found",
                id
            ))),
        }
    }

    async fn set_article(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        article_id: i64,
    ) -> Result<WorkOutcome> {
        state.consecutive_tool_calls = 0;
        let candidates: Vec<i64> = match state.knowledge_base_id_i64() {
            Some(id) => vec![id],
            None => ctx
                .knowledge_base
                .get_knowledge_bases()
                .await?
                .into_iter()
                .map(|kb| kb.id)
                .collect(),
        };

        for kb_id in candidates {
            if let Some(article) = ctx.knowledge_base.get_article_by_id(kb_id, article_id).await? {
                state.article_id = Some(article.id.to_string());
                state.knowledge_base_id = Some(article.knowledge_base_id.to_string());
                let mut outcome = WorkOutcome::ok(format!(
                    "Article context set to: {} (ID: {})",
                    article.title, article.id
                ));
                outcome.results =
                    json!({ "article_id": article.id, "knowledge_base_id": article.knowledge_base_id });
                return Ok(outcome);
            }
        }
        Ok(WorkOutcome::failed(format!(
            "Article {} was not found",
            article_id
        )))
    }

    async fn retrieve(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        request: &str,
    ) -> Result<WorkOutcome> {
        state.consecutive_tool_calls = 0;
        let lowered = request.to_lowercase();
        let wants_all = lowered.contains("all kbs")
            || lowered.contains("knowledge bases")
            || lowered.contains("all kb");

        match state.knowledge_base_id_i64() {
            Some(kb_id) if !wants_all => {
                let nodes = ctx.knowledge_base.get_article_hierarchy(kb_id).await?;
                let name = state
                    .knowledge_base_name
                    .clone()
                    .unwrap_or_else(|| format!("Knowledge base {}", kb_id));
                let mut outcome = WorkOutcome::ok(format!(
                    "Articles in {}:\n{}",
                    name,
                    render_hierarchy(&nodes)
                ));
                outcome.retrieved_count = nodes.len() as i64;
                outcome.results = json!({ "article_count": nodes.len() });
                Ok(outcome)
            }
            _ => {
                let kbs = ctx.knowledge_base.get_knowledge_bases().await?;
                let listing = kbs
                    .iter()
                    .map(|kb| format!("[{}] {} - {}", kb.id, kb.name, kb.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                let mut outcome = WorkOutcome::ok(if kbs.is_empty() {
                    "No knowledge bases exist yet.".to_string()
                } else {
                    format!("Available knowledge bases:\n{}", listing)
                });
                outcome.retrieved_count = kbs.len() as i64;
                outcome.results = json!({ "knowledge_base_count": kbs.len() });
                Ok(outcome)
            }
        }
    }

    async fn search(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        request: &str,
    ) -> Result<WorkOutcome> {
        state.consecutive_tool_calls = 0;
        let Some(kb_id) = state.knowledge_base_id_i64() else {
            return Ok(WorkOutcome::failed(
                "No knowledge base selected. Say 'use kb <id>' first.",
            ));
        };
        let term = extract_search_term(request);
        let articles = ctx.knowledge_base.search_articles(kb_id, &term).await?;
        let mut outcome = if articles.is_empty() {
            WorkOutcome::ok(format!("No articles match '{}'.", term))
        } else {
            WorkOutcome::ok(format!(
                "Articles matching '{}':\n{}",
                term,
                articles
                    .iter()
                    .map(|a| format!("- [{}] {}", a.id, a.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            ))
        };
        outcome.retrieved_count = articles.len() as i64;
        outcome.results = json!({ "query": term, "matches": articles.len() });
        Ok(outcome)
    }

    /// 交给模型用工具完成
    async fn with_tools(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        intent: &str,
        request: &str,
    ) -> Result<WorkOutcome> {
        state.consecutive_tool_calls += 1;

        let mut user_prompt = prompts::content_management_request(
            request,
            intent,
            &describe_kb(state),
            state.article_id.as_deref().unwrap_or("none"),
        );
        if state.consecutive_tool_calls >= TOOL_CALL_WARNING_THRESHOLD {
            user_prompt.push_str(&format!(
                "\n\n⚠️ WARNING: this is tool-driven step {} in a row. Avoid repeating earlier tool calls and finish with a summary.",
                state.consecutive_tool_calls
            ));
        }
        if let Some(last) = &state.last_tool_result {
            user_prompt.push_str(&format!("\n\nPrevious tool results:\n{}", last));
        }

        let toolbox = ctx.toolbox(AgentName::ContentManagement);
        let reply = ctx
            .llm
            .complete_with_tools(
                &ctx.system_prompt(prompts::CONTENT_MANAGEMENT_PROMPT),
                &user_prompt,
                &toolbox,
            )
            .await?;
        let effects = toolbox.take_effects();
        apply_effects(state, &effects);

        let mut content = reply.trim().to_string();
        if !effects.is_empty() {
            let summary = effects
                .iter()
                .map(|e| format!("{}: {}", e.tool, e.summary))
                .collect::<Vec<_>>()
                .join("\n");
            let summary = truncate_chars(&summary, LAST_TOOL_RESULT_CHARS);
            if state.last_tool_result.as_deref() == Some(summary.as_str()) {
                warn!("⚠️ 工具调用结果与上一次相同");
                content.push_str("\n\n(Note: the tool results repeated the previous step.)");
            }
            state.last_tool_result = Some(summary);
        }

        let mut outcome = WorkOutcome::ok(content);
        outcome.tool_executed = !effects.is_empty();
        outcome.results = json!({
            "tools": effects.iter().map(|e| e.tool).collect::<Vec<_>>(),
        });
        Ok(outcome)
    }
}

fn describe_kb(state: &SharedState) -> String {
    match (&state.knowledge_base_id, &state.knowledge_base_name) {
        (Some(id), Some(name)) => format!("{} (ID: {})", name, id),
        (Some(id), None) => id.clone(),
        _ => "none".to_string(),
    }
}

/// 工具对上下文的修改写回共享状态
fn apply_effects(state: &mut SharedState, effects: &[ToolEffect]) {
    for effect in effects {
        match &effect.context {
            Some(ContextChange::KnowledgeBase { id, name }) => {
                debug!("工具切换知识库: {}", id);
                state.knowledge_base_id = Some(id.to_string());
                state.knowledge_base_name = Some(name.clone());
            }
            Some(ContextChange::Article {
                knowledge_base_id,
                article_id,
            }) => {
                state.knowledge_base_id = Some(knowledge_base_id.to_string());
                state.article_id = Some(article_id.to_string());
            }
            None => {}
        }
    }
}

#[async_trait]
impl Agent for ContentManagement {
    fn name(&self) -> AgentName {
        AgentName::ContentManagement
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::ContentManagement);

        let Some(message) = state.take_latest(AgentName::ContentManagement) else {
            state.current_agent = Some(AgentName::UserProxy);
            return Ok(());
        };

        let intent = message
            .meta_str("intent")
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .or_else(|| state.user_intent.clone())
            .unwrap_or_else(|| "general_inquiry".to_string());
        let original_request = message
            .meta_str("original_request")
            .map(str::to_string)
            .unwrap_or_else(|| message.content.clone());
        let request = if message.message_type == MessageType::RevisionRequest {
            format!(
                "{}\n\nSupervisor feedback on the previous attempt: {}",
                original_request, message.content
            )
        } else {
            original_request.clone()
        };
        debug!("ContentManagement执行 {}: {}", intent, request);

        let outcome = match self.execute(state, ctx, &intent, &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("❌ ContentManagement执行失败: {}", e);
                let mut outcome = WorkOutcome::failed(format!("Error while processing the request: {}", e));
                outcome.tool_errors = 1;
                outcome
            }
        };

        state.post(
            AgentMessage::new(
                AgentName::ContentManagement,
                AgentName::Supervisor,
                MessageType::WorkflowResponse,
                outcome.content,
            )
            .with("success", outcome.success)
            .with("results", outcome.results)
            .with("intent", intent)
            .with("original_request", original_request)
            .with("retrieved_count", outcome.retrieved_count)
            .with("tool_errors", outcome.tool_errors)
            .with("tool_executed", outcome.tool_executed),
        );
        state.current_agent = Some(AgentName::Supervisor);
        Ok(())
    }
}
