//! UserProxy：对话的入口与出口

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{
    Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState, prompts,
    router::{PENDING_CLASSIFICATION, USER_REQUEST_PREFIX},
};

const CONVERSATION_WINDOW: usize = 10;

pub struct UserProxy;

#[async_trait]
impl Agent for UserProxy {
    fn name(&self) -> AgentName {
        AgentName::UserProxy
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        if state.awaiting_reply() && !state.input_forwarded {
            state.recursions = 0;
            ctx.begin_step(state, AgentName::UserProxy);
            forward_input(state);
            return Ok(());
        }

        ctx.begin_step(state, AgentName::UserProxy);
        if let Some(message) = state.take_latest(AgentName::UserProxy) {
            let reply = match message.message_type {
                MessageType::DirectResponseRequest => direct_response(state, ctx, &message).await?,
                MessageType::WorkflowError => format!("❌ {}", message.content),
                MessageType::WorkflowComplete => format_completion(
                    message.meta_str("intent").or(state.user_intent.as_deref()),
                    &message.content,
                ),
                _ => message.content.clone(),
            };
            state.push_assistant(reply);
        }
        state.current_agent = Some(AgentName::UserProxy);
        Ok(())
    }
}

/// 新的用户输入：清理旧信封，交给Router
fn forward_input(state: &mut SharedState) {
    let Some(input) = state.last_user_input().map(str::to_string) else {
        return;
    };

    state.mark_all_processed();
    state.revision_count = 0;
    if let Some(previous) = state
        .user_intent
        .clone()
        .filter(|intent| intent != PENDING_CLASSIFICATION)
    {
        state
            .task_context
            .insert("previous_intent".to_string(), Value::String(previous));
    }
    state.user_intent = Some(PENDING_CLASSIFICATION.to_string());
    state.post(
        AgentMessage::new(
            AgentName::UserProxy,
            AgentName::Router,
            MessageType::WorkRequest,
            format!("{}{}", USER_REQUEST_PREFIX, input),
        )
        .with("original_request", input),
    );
    state.input_forwarded = true;
    state.current_agent = Some(AgentName::Router);
}

async fn direct_response(
    state: &SharedState,
    ctx: &AgentContext,
    message: &AgentMessage,
) -> Result<String> {
    let request = message
        .meta_str("original_request")
        .unwrap_or(&message.content);

    let mut context = Vec::new();
    match (&state.knowledge_base_id, &state.knowledge_base_name) {
        (Some(id), Some(name)) => context.push(format!("Current knowledge base: {} (ID: {})", name, id)),
        (Some(id), None) => context.push(format!("Current knowledge base ID: {}", id)),
        _ => context.push("No knowledge base selected".to_string()),
    }
    if let Some(article) = &state.article_id {
        context.push(format!("Current article ID: {}", article));
    }
    if let Ok(kbs) = ctx.knowledge_base.get_knowledge_bases().await {
        let names: Vec<String> = kbs.iter().map(|kb| format!("[{}] {}", kb.id, kb.name)).collect();
        if !names.is_empty() {
            context.push(format!("Available knowledge bases: {}", names.join(", ")));
        }
    }

    let user_prompt = prompts::direct_response_prompt(
        request,
        &context.join("\n"),
        &state.recent_conversation(CONVERSATION_WINDOW),
    );
    let reply = ctx
        .llm
        .complete(&ctx.system_prompt(prompts::USER_PROXY_PROMPT), &user_prompt)
        .await?;
    Ok(reply.trim().to_string())
}

/// workflow_complete的展示文本
pub fn format_completion(intent: Option<&str>, content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return "✅ Task completed.".to_string();
    }
    match intent {
        Some("set_knowledge_base_context") | Some("set_article_context") => format!("✅ {}", content),
        Some("create_content") => format!("📝 {}", content),
        Some("retrieve_content") | Some("retrieve_filtered_content") | Some("search_content") => {
            format!("📚 {}", content)
        }
        Some("analyze_content_gaps") => format!("🔍 {}", content),
        _ => content.to_string(),
    }
}
