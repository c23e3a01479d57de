//! Supervisor：分派工作并在结果返回用户前做质量评审

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::{Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState};

/// 评审结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Revise,
    Escalate,
}

/// 对一次workflow_response的评审
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub score: i32,
    pub decision: ReviewDecision,
    pub feedback: Vec<String>,
}

pub struct Supervisor;

pub const SESSION_RESET_REPLY: &str = "🔄 Session Reset: the request went back and forth between agents too many times. Please rephrase or try a more specific request.";

/// 根据意图给ContentManagement的结果打分，满分10
pub fn review_response(state: &SharedState, message: &AgentMessage, intent: &str) -> Review {
    let success = message.meta_bool("success").unwrap_or(false);
    let mentions_error = message.content.to_lowercase().contains("error");
    let mut score = 10;
    let mut feedback = Vec::new();

    let mut deduct = |points: i32, reason: &str| {
        score -= points;
        feedback.push(reason.to_string());
    };

    let (approve_at, revise_at) = match intent {
        "set_knowledge_base_context" => {
            if state.knowledge_base_id.is_none() {
                deduct(5, "No knowledge base is selected");
            }
            if !success {
                deduct(3, "The operation did not report success");
            }
            if mentions_error {
                deduct(2, "The result mentions an error");
            }
            (8, 6)
        }
        "create_content" => {
            if message.meta_i64("articles_created").unwrap_or(0) == 0 {
                deduct(5, "No articles were created");
            }
            let tool_errors = message.meta_i64("tool_errors").unwrap_or(0);
            for _ in 0..tool_errors.clamp(0, 5) {
                deduct(2, "A tool call failed");
            }
            if state.knowledge_base_id.is_none() {
                deduct(3, "No knowledge base is selected");
            }
            if mentions_error {
                deduct(2, "The result mentions an error");
            }
            (8, 6)
        }
        "retrieve_content" | "search_content" => {
            if message.meta_i64("retrieved_count").unwrap_or(0) == 0 {
                deduct(4, "Nothing was retrieved");
            }
            if mentions_error {
                deduct(3, "The result mentions an error");
            }
            (7, 5)
        }
        _ => {
            if !success {
                deduct(4, "The operation did not report success");
            }
            if mentions_error {
                deduct(3, "The result mentions an error");
            }
            if message.content.trim().is_empty() {
                deduct(5, "The result is empty");
            }
            let approve_at = if success { 5 } else { 7 };
            (approve_at, 5)
        }
    };

    let decision = if score >= approve_at {
        ReviewDecision::Approve
    } else if score >= revise_at {
        ReviewDecision::Revise
    } else {
        ReviewDecision::Escalate
    };
    Review {
        score,
        decision,
        feedback,
    }
}

impl Supervisor {
    fn reset_session(&self, state: &mut SharedState) {
        warn!(
            "⚠️ Supervisor重置会话: recursions={}, loop_detected={}",
            state.recursions, state.loop_detected
        );
        state.loop_detected = false;
        state.agent_sequence.clear();
        state.mark_all_processed();
        state.post(
            AgentMessage::new(
                AgentName::Supervisor,
                AgentName::UserProxy,
                MessageType::InfoResponse,
                SESSION_RESET_REPLY,
            )
            .with("intent", "session_reset"),
        );
        state.current_agent = Some(AgentName::UserProxy);
    }

    fn delegate(&self, state: &mut SharedState, request: String, intent: Option<String>) {
        let intent = intent.or_else(|| state.user_intent.clone()).unwrap_or_default();
        state.post(
            AgentMessage::new(
                AgentName::Supervisor,
                AgentName::ContentManagement,
                MessageType::SupervisedWorkRequest,
                request.clone(),
            )
            .with("intent", intent)
            .with("original_request", request)
            .with("requires_review", true),
        );
        state.current_agent = Some(AgentName::ContentManagement);
    }

    /// 评审工作结果；`allow_revision` 为false时不再打回
    fn handle_response(
        &self,
        state: &mut SharedState,
        ctx: &AgentContext,
        message: AgentMessage,
        allow_revision: bool,
    ) {
        let intent = message
            .meta_str("intent")
            .map(str::to_string)
            .or_else(|| state.user_intent.clone())
            .unwrap_or_else(|| "general_inquiry".to_string());
        let review = review_response(state, &message, &intent);
        info!(
            "📋 Supervisor评审 {}: {}/10 {:?}",
            intent, review.score, review.decision
        );

        let max_revisions = ctx.config.orchestrator.max_revisions;
        let decision = match review.decision {
            ReviewDecision::Revise if !allow_revision || state.revision_count >= max_revisions => {
                ReviewDecision::Approve
            }
            other => other,
        };
        let feedback = review.feedback.join("; ");

        match decision {
            ReviewDecision::Approve => {
                state.post(
                    AgentMessage::new(
                        AgentName::Supervisor,
                        AgentName::UserProxy,
                        MessageType::WorkflowComplete,
                        message.content.clone(),
                    )
                    .with("intent", intent)
                    .with("quality_score", review.score)
                    .with("feedback", feedback),
                );
                state.current_agent = Some(AgentName::UserProxy);
            }
            ReviewDecision::Revise => {
                state.revision_count += 1;
                let original = message
                    .meta_str("original_request")
                    .map(str::to_string)
                    .unwrap_or_else(|| message.content.clone());
                state.post(
                    AgentMessage::new(
                        AgentName::Supervisor,
                        AgentName::ContentManagement,
                        MessageType::RevisionRequest,
                        feedback,
                    )
                    .with("intent", intent)
                    .with("original_request", original)
                    .with("quality_score", review.score),
                );
                state.current_agent = Some(AgentName::ContentManagement);
            }
            ReviewDecision::Escalate => {
                state.post(
                    AgentMessage::new(
                        AgentName::Supervisor,
                        AgentName::UserProxy,
                        MessageType::WorkflowError,
                        format!(
                            "The request could not be completed ({}). {}",
                            feedback,
                            message.content.trim()
                        ),
                    )
                    .with("intent", intent)
                    .with("quality_score", review.score),
                );
                state.current_agent = Some(AgentName::UserProxy);
            }
        }
    }
}

#[async_trait]
impl Agent for Supervisor {
    fn name(&self) -> AgentName {
        AgentName::Supervisor
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::Supervisor);

        if state.recursions > ctx.config.orchestrator.supervisor_reset_threshold {
            self.reset_session(state);
            return Ok(());
        }

        // 检测到循环时，已有的工作结果直接交付，没有结果才重置
        let allow_revision = !state.loop_detected;
        if state.loop_detected {
            let pending_response = state
                .latest_pending(AgentName::Supervisor)
                .is_some_and(|m| m.message_type == MessageType::WorkflowResponse);
            if !pending_response {
                self.reset_session(state);
                return Ok(());
            }
            warn!("⚠️ 检测到循环，交付当前结果而不再打回");
            state.loop_detected = false;
            state.agent_sequence.clear();
        }

        let Some(message) = state.take_latest(AgentName::Supervisor) else {
            let request = state.last_user_input().unwrap_or_default().to_string();
            self.delegate(state, request, None);
            return Ok(());
        };

        match message.message_type {
            MessageType::WorkflowResponse => {
                self.handle_response(state, ctx, message, allow_revision)
            }
            MessageType::StatusUpdate if message.meta_bool("work_available") == Some(false) => {
                state.post(AgentMessage::new(
                    AgentName::Supervisor,
                    AgentName::UserProxy,
                    MessageType::InfoResponse,
                    message.content,
                ));
                state.current_agent = Some(AgentName::UserProxy);
            }
            _ => {
                let request = message
                    .meta_str("original_request")
                    .map(str::to_string)
                    .unwrap_or_else(|| message.content.clone());
                let intent = message.meta_str("intent").map(str::to_string);
                self.delegate(state, request, intent);
            }
        }
        Ok(())
    }
}
