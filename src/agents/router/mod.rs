//! Router：识别用户意图并把请求交给对应的agent

use anyhow::Result;
use async_trait::async_trait;

use super::{Agent, AgentContext, AgentMessage, AgentName, MessageType, SharedState};
use crate::config::ClassifierStrategy;

pub mod intent;
pub mod keyword_classifier;
pub mod llm_classifier;

pub use intent::{Intent, target_for};
pub use keyword_classifier::KeywordIntentClassifier;
pub use llm_classifier::{LlmIntentClassifier, parse_classification};

/// UserProxy转发时加在请求前的前缀
pub const USER_REQUEST_PREFIX: &str = "User request: ";
/// 分类完成之前的意图占位
pub const PENDING_CLASSIFICATION: &str = "pending_classification";
const RECENT_ACTIONS_LIMIT: usize = 5;

/// 分类结果，置信度为0-100
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

impl Classification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 100.0),
            reasoning: None,
        }
    }
}

/// 分类时可参考的会话上下文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationContext {
    pub current_kb: Option<String>,
    pub current_article: Option<String>,
    pub previous_intent: Option<String>,
    pub recent_actions: Vec<String>,
}

impl ClassificationContext {
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            current_kb: state.knowledge_base_id.clone(),
            current_article: state
                .article_id
                .clone()
                .or_else(|| state.current_section.clone()),
            previous_intent: state
                .task_context
                .get("previous_intent")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| state.user_intent.clone())
                .filter(|intent| intent != PENDING_CLASSIFICATION),
            recent_actions: state.recent_intents(RECENT_ACTIONS_LIMIT),
        }
    }

    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(kb) = &self.current_kb {
            lines.push(format!("Current Knowledge Base: {}", kb));
        }
        if let Some(article) = &self.current_article {
            lines.push(format!("Current Article Context: {}", article));
        }
        if !self.recent_actions.is_empty() {
            let recent: Vec<&str> = self
                .recent_actions
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            lines.push(format!("Recent Actions: {}", recent.join(", ")));
        }
        if let Some(intent) = &self.previous_intent {
            lines.push(format!("Previous Intent: {}", intent));
        }
        lines
    }
}

/// 意图分类器
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        context: &ClassificationContext,
    ) -> Result<Classification>;
}

pub struct Router {
    classifier: Box<dyn IntentClassifier>,
}

impl Router {
    pub fn new(classifier: Box<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// 按配置选择分类器
    pub fn from_context(ctx: &AgentContext) -> Self {
        let classifier: Box<dyn IntentClassifier> = match ctx.config.orchestrator.classifier {
            ClassifierStrategy::Llm => Box::new(LlmIntentClassifier::new(ctx.llm.clone())),
            ClassifierStrategy::Keyword => Box::new(KeywordIntentClassifier::new()),
        };
        Self::new(classifier)
    }
}

#[async_trait]
impl Agent for Router {
    fn name(&self) -> AgentName {
        AgentName::Router
    }

    async fn process(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        ctx.begin_step(state, AgentName::Router);

        let Some(message) = state.take_latest(AgentName::Router) else {
            state.current_agent = Some(AgentName::UserProxy);
            return Ok(());
        };

        let request = message
            .content
            .strip_prefix(USER_REQUEST_PREFIX)
            .unwrap_or(&message.content)
            .trim()
            .to_string();
        let context = ClassificationContext::from_state(state);
        let classification = self.classifier.classify(&request, &context).await?;
        let intent = classification.intent;
        let target = intent.target_agent();

        println!(
            "🧭 意图: {} ({:.0}%) -> {}",
            intent, classification.confidence, target
        );

        let message_type = if target == AgentName::UserProxy {
            MessageType::DirectResponseRequest
        } else {
            MessageType::WorkRequest
        };
        state.post(
            AgentMessage::new(AgentName::Router, target, message_type, request.clone())
                .with("intent", intent.as_str())
                .with("confidence", classification.confidence)
                .with("original_request", request),
        );

        state.user_intent = Some(intent.as_str().to_string());
        state.intent_confidence = Some(classification.confidence);
        state.current_agent = Some(target);
        Ok(())
    }
}

// Include tests
#[cfg(test)]
mod tests;
