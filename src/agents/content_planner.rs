//! ContentPlanner：内容规划与缺口分析

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::{Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState, prompts};
use crate::knowledge_base::{Article, NewKnowledgeBase, render_hierarchy};

/// 正文短于该字符数视为内容单薄
const THIN_CONTENT_CHARS: usize = 200;
const MAX_TITLE_CHARS: usize = 60;
const DEFAULT_KB_TITLE: &str = "New Knowledge Base";

const CLARIFICATION_PHRASES: [&str; 6] = [
    "need clarification",
    "unclear scope",
    "ambiguous request",
    "could you specify",
    "more details needed",
    "unclear focus",
];

static KB_REQUEST_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:create|build|make|generate)\s+(?:a\s+|an\s+|the\s+)?(?:new\s+)?(?:knowledge\s+base|kb)\s+(?:about|on|for)\s+",
    )
    .unwrap()
});

static CONTENT_REQUEST_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?(?:create|build|make|generate|write|add)\b.*?\b(?:about|on|for)\s+")
        .unwrap()
});

/// 根据请求生成新知识库的标题
pub fn knowledge_base_title(request: &str) -> String {
    let stripped = if KB_REQUEST_PREFIX.is_match(request) {
        KB_REQUEST_PREFIX.replace(request, "")
    } else {
        CONTENT_REQUEST_PREFIX.replace(request, "")
    };
    let topic: String = stripped
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?')
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    let title = topic
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    if title.is_empty() {
        DEFAULT_KB_TITLE.to_string()
    } else {
        title
    }
}

pub fn needs_clarification(plan: &str) -> bool {
    let lowered = plan.to_lowercase();
    CLARIFICATION_PHRASES.iter().any(|p| lowered.contains(p))
}

/// 取出计划中某个标题下的内容，遇到下一个已知标题为止
fn plan_section(plan: &str, header: &str) -> String {
    const HEADERS: [&str; 3] = ["STRATEGY", "HIERARCHY", "IMPLEMENTATION PLAN"];
    let mut collecting = false;
    let mut lines = Vec::new();
    for line in plan.lines() {
        let upper = line.to_uppercase();
        let is_header = HEADERS.iter().any(|h| {
            upper
                .trim_start_matches(|c: char| !c.is_alphabetic())
                .starts_with(h)
        });
        if is_header {
            if collecting {
                break;
            }
            if upper.contains(header) {
                collecting = true;
                if let Some((_, rest)) = line.split_once(':') {
                    if !rest.trim().is_empty() {
                        lines.push(rest.trim());
                    }
                }
            }
            continue;
        }
        if collecting {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_string()
}

pub struct ContentPlanner;

impl ContentPlanner {
    async fn analyze_gaps(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        let report = match state.knowledge_base_id_i64() {
            Some(kb_id) => gap_report(ctx, kb_id).await?,
            None => "No knowledge base is selected. Say 'use kb <id>' to pick one before analysing gaps.".to_string(),
        };
        info!("🔍 缺口分析完成");
        state.post(
            AgentMessage::new(
                AgentName::ContentPlanner,
                AgentName::UserProxy,
                MessageType::WorkflowComplete,
                report,
            )
            .with("intent", "analyze_content_gaps"),
        );
        state.current_agent = Some(AgentName::UserProxy);
        Ok(())
    }

    /// 没有选中知识库时按请求新建一个
    async fn ensure_knowledge_base(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        request: &str,
    ) -> Result<i64> {
        if let Some(id) = state.knowledge_base_id_i64() {
            return Ok(id);
        }
        let name = knowledge_base_title(request);
        let kb = ctx
            .knowledge_base
            .insert_knowledge_base(NewKnowledgeBase {
                name: name.clone(),
                description: format!("Knowledge base created for: {}", request),
                author_id: 1,
                gitlab_project_id: None,
            })
            .await?;
        info!("📚 新建知识库: {} (ID: {})", kb.name, kb.id);
        open_management_issues(ctx, &kb.name).await;
        state.knowledge_base_id = Some(kb.id.to_string());
        state.knowledge_base_name = Some(kb.name);
        state.article_id = None;
        Ok(kb.id)
    }
}

/// 为新知识库在默认GitLab项目中开出管理issue，失败只记录日志
async fn open_management_issues(ctx: &AgentContext, kb_name: &str) {
    let (Some(gitlab), Some(project_id)) = (
        ctx.gitlab.as_ref(),
        ctx.config.gitlab.default_project_id.as_deref(),
    ) else {
        return;
    };
    match gitlab.create_kb_management_issues(project_id, kb_name).await {
        Ok(issues) => info!("🦊 已为 {} 创建 {} 个管理issue", kb_name, issues.len()),
        Err(e) => warn!("⚠️ 无法为 {} 创建管理issue: {}", kb_name, e),
    }
}

/// 分层遍历知识库中的全部文章
async fn collect_articles(ctx: &AgentContext, kb_id: i64) -> Result<(Vec<Article>, Vec<Article>)> {
    let roots = ctx.knowledge_base.get_root_level_articles(kb_id).await?;
    let mut all = roots.clone();
    let mut frontier: Vec<i64> = roots.iter().map(|a| a.id).collect();
    while !frontier.is_empty() {
        let children = ctx
            .knowledge_base
            .get_articles_by_parent_ids(kb_id, &frontier)
            .await?;
        frontier = children
            .iter()
            .map(|a| a.id)
            .filter(|id| !all.iter().any(|seen| seen.id == *id))
            .collect();
        all.extend(children.into_iter().filter(|a| frontier.contains(&a.id)));
    }
    Ok((roots, all))
}

async fn gap_report(ctx: &AgentContext, kb_id: i64) -> Result<String> {
    let (roots, all) = collect_articles(ctx, kb_id).await?;
    if all.is_empty() {
        return Ok(format!(
            "Knowledge base {} is empty. Start by creating top-level categories for its main topics.",
            kb_id
        ));
    }

    let mut findings = Vec::new();
    for root in &roots {
        if !all.iter().any(|a| a.parent_id == Some(root.id)) {
            findings.push(format!(
                "- Category '{}' (ID: {}) has no sub-articles",
                root.title, root.id
            ));
        }
    }
    for article in &all {
        let length = article.content.trim().chars().count();
        if length < THIN_CONTENT_CHARS {
            findings.push(format!(
                "- Article '{}' (ID: {}) is thin ({} characters)",
                article.title, article.id, length
            ));
        }
    }

    if findings.is_empty() {
        Ok(format!(
            "Content gap analysis for knowledge base {}: {} articles reviewed, no gaps found.",
            kb_id,
            all.len()
        ))
    } else {
        Ok(format!(
            "Content gap analysis for knowledge base {} ({} articles):\n{}",
            kb_id,
            all.len(),
            findings.join("\n")
        ))
    }
}

#[async_trait]
impl Agent for ContentPlanner {
    fn name(&self) -> AgentName {
        AgentName::ContentPlanner
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::ContentPlanner);

        let Some(message) = state.take_latest(AgentName::ContentPlanner) else {
            return Ok(());
        };
        let intent = message
            .meta_str("intent")
            .map(str::to_string)
            .or_else(|| state.user_intent.clone())
            .unwrap_or_else(|| "create_content".to_string());
        if intent == "analyze_content_gaps" {
            return self.analyze_gaps(state, ctx).await;
        }

        let request = message
            .meta_str("original_request")
            .map(str::to_string)
            .unwrap_or_else(|| message.content.clone());
        let kb_label = match (&state.knowledge_base_id, &state.knowledge_base_name) {
            (Some(id), Some(name)) => format!("{} (ID: {})", name, id),
            _ => "none selected (a new one will be created)".to_string(),
        };
        let hierarchy = match state.knowledge_base_id_i64() {
            Some(kb_id) => render_hierarchy(&ctx.knowledge_base.get_article_hierarchy(kb_id).await?),
            None => String::new(),
        };

        let plan = ctx
            .llm
            .complete(
                &ctx.system_prompt(prompts::CONTENT_PLANNER_PROMPT),
                &prompts::planning_request(&request, &kb_label, &hierarchy),
            )
            .await?;

        if needs_clarification(&plan) {
            debug!("ContentPlanner需要澄清");
            state.post(
                AgentMessage::new(
                    AgentName::ContentPlanner,
                    AgentName::UserProxy,
                    MessageType::ClarificationRequest,
                    plan.trim(),
                )
                .with("intent", intent),
            );
            state.current_agent = Some(AgentName::UserProxy);
            return Ok(());
        }

        let kb_id = self.ensure_knowledge_base(state, ctx, &request).await?;
        info!("🗺️ 内容计划已生成, 知识库 {}", kb_id);
        state.post(
            AgentMessage::new(
                AgentName::ContentPlanner,
                AgentName::ContentCreator,
                MessageType::ContentCreationPlan,
                plan.trim(),
            )
            .with("strategy", plan_section(&plan, "STRATEGY"))
            .with("hierarchy", plan_section(&plan, "HIERARCHY"))
            .with("implementation_plan", plan_section(&plan, "IMPLEMENTATION PLAN"))
            .with("kb_id", kb_id)
            .with("original_request", request)
            .with("intent", intent),
        );
        state.current_agent = Some(AgentName::ContentCreator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_base_title() {
        assert_eq!(
            knowledge_base_title("create a knowledge base about rust async programming"),
            "Rust Async Programming"
        );
        assert_eq!(knowledge_base_title("Build a new KB for team onboarding."), "Team Onboarding");
        assert_eq!(knowledge_base_title("create a new article about rust"), "Rust");
        assert_eq!(knowledge_base_title("   "), DEFAULT_KB_TITLE);
    }

    #[test]
    fn test_plan_section() {
        let plan = "STRATEGY: teach the basics\nHIERARCHY:\n- Intro\n  - Setup\nIMPLEMENTATION PLAN:\n1. Intro first";
        assert_eq!(plan_section(plan, "STRATEGY"), "teach the basics");
        assert_eq!(plan_section(plan, "HIERARCHY"), "- Intro\n  - Setup");
        assert_eq!(plan_section(plan, "IMPLEMENTATION PLAN"), "1. Intro first");
    }

    #[test]
    fn test_needs_clarification() {
        assert!(needs_clarification("NEED CLARIFICATION: which audience?"));
        assert!(needs_clarification("The request has an unclear scope."));
        assert!(!needs_clarification("STRATEGY: cover ownership"));
    }
}
