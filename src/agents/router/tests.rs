#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::agents::router::{
        ClassificationContext, Intent, IntentClassifier, KeywordIntentClassifier,
        LlmIntentClassifier, Router, parse_classification, target_for,
    };
    use crate::agents::test_support::keyword_context;
    use crate::agents::{Agent, AgentMessage, AgentName, MessageType, SharedState};
    use crate::error::ClassifierError;
    use crate::llm::{ChatModel, ScriptedModel};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_keyword_use_kb() {
        let result = KeywordIntentClassifier::new().score("use kb 1");
        assert_eq!(result.intent, Intent::SetKnowledgeBaseContext);
        assert!(close(result.confidence, 84.5), "got {}", result.confidence);
    }

    #[test]
    fn test_keyword_create_article() {
        let result = KeywordIntentClassifier::new().score("create a new article about rust");
        assert_eq!(result.intent, Intent::CreateContent);
        assert!(close(result.confidence, 84.0), "got {}", result.confidence);
    }

    #[test]
    fn test_keyword_nothing_matches() {
        let result = KeywordIntentClassifier::new().score("zzz qqq");
        assert_eq!(result.intent, Intent::GeneralInquiry);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_keyword_gap_analysis() {
        let result = KeywordIntentClassifier::new().score("find gaps in the content coverage");
        assert_eq!(result.intent, Intent::AnalyzeContentGaps);
    }

    #[test]
    fn test_intent_targets() {
        assert_eq!(target_for("create_content"), AgentName::ContentPlanner);
        assert_eq!(target_for("search_content"), AgentName::Supervisor);
        assert_eq!(target_for("general_inquiry"), AgentName::UserProxy);
        assert_eq!(target_for("something_else"), AgentName::ContentPlanner);
    }

    #[test]
    fn test_parse_direct_json() {
        let parsed =
            parse_classification(r#"{"intent": "search_content", "confidence": 91, "reasoning": "x"}"#)
                .unwrap();
        assert_eq!(parsed.intent, Intent::SearchContent);
        assert_eq!(parsed.confidence, 91.0);
        assert_eq!(parsed.reasoning.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_fenced_and_embedded() {
        let fenced = "Sure!\n```json\n{\"intent\": \"update_content\", \"confidence\": 70}\n```";
        assert_eq!(parse_classification(fenced).unwrap().intent, Intent::UpdateContent);

        let embedded = "I think {\"intent\": \"retrieve_content\", \"confidence\": 300, \"reasoning\": \"wants {all}\"} fits.";
        let parsed = parse_classification(embedded).unwrap();
        assert_eq!(parsed.intent, Intent::RetrieveContent);
        assert_eq!(parsed.confidence, 100.0);
    }

    #[test]
    fn test_parse_defaults_and_errors() {
        let unknown = parse_classification(r#"{"intent": "dance"}"#).unwrap();
        assert_eq!(unknown.intent, Intent::GeneralInquiry);
        assert_eq!(unknown.confidence, 50.0);

        let negative = parse_classification(r#"{"intent": "create_content", "confidence": -5}"#).unwrap();
        assert_eq!(negative.confidence, 0.0);

        assert_eq!(parse_classification("   "), Err(ClassifierError::EmptyResponse));
        assert_eq!(parse_classification("no json here"), Err(ClassifierError::NoJson));
        assert_eq!(
            parse_classification(r#"{"confidence": 3}"#),
            Err(ClassifierError::MissingIntent)
        );
    }

    #[tokio::test]
    async fn test_llm_classifier_fallbacks() {
        let model = Arc::new(ScriptedModel::new("I cannot answer that"));
        let classifier = LlmIntentClassifier::new(model.clone());
        let context = ClassificationContext::default();

        let empty = classifier.classify("  ", &context).await.unwrap();
        assert_eq!((empty.intent, empty.confidence), (Intent::GeneralInquiry, 0.0));
        assert_eq!(model.call_count(), 0);

        let garbage = classifier.classify("hello", &context).await.unwrap();
        assert_eq!((garbage.intent, garbage.confidence), (Intent::GeneralInquiry, 10.0));
    }

    /// 每次调用都失败，分别统计两种入口的调用次数
    #[derive(Default)]
    struct UnavailableModel {
        completions: AtomicUsize,
        single_attempts: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for UnavailableModel {
        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.completions.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }

        async fn complete_once(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.single_attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_llm_classifier_makes_one_attempt_on_failure() {
        let model = Arc::new(UnavailableModel::default());
        let classifier = LlmIntentClassifier::new(model.clone());

        let result = classifier
            .classify("show all articles", &ClassificationContext::default())
            .await
            .unwrap();

        assert_eq!((result.intent, result.confidence), (Intent::GeneralInquiry, 10.0));
        assert_eq!(model.single_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(model.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_classifier_sees_context() {
        let model = Arc::new(ScriptedModel::new(
            r#"{"intent": "set_article_context", "confidence": 88}"#,
        ));
        let classifier = LlmIntentClassifier::new(model.clone());
        let context = ClassificationContext {
            current_kb: Some("3".to_string()),
            ..Default::default()
        };
        let result = classifier.classify("work on article 4", &context).await.unwrap();
        assert_eq!(result.intent, Intent::SetArticleContext);
        assert!(model.calls()[0].user_prompt.contains("Current Knowledge Base: 3"));
    }

    #[tokio::test]
    async fn test_router_posts_work_request() {
        let (ctx, _) = keyword_context(ScriptedModel::new("")).await;
        let router = Router::from_context(&ctx);
        let mut state = SharedState::new();
        state.post(AgentMessage::new(
            AgentName::UserProxy,
            AgentName::Router,
            MessageType::WorkRequest,
            "User request: use kb 1",
        ));

        router.process(&mut state, &ctx).await.unwrap();

        assert_eq!(state.current_agent, Some(AgentName::Supervisor));
        assert_eq!(state.user_intent.as_deref(), Some("set_knowledge_base_context"));
        let sent = state.latest_pending(AgentName::Supervisor).unwrap();
        assert_eq!(sent.message_type, MessageType::WorkRequest);
        assert_eq!(sent.content, "use kb 1");
        assert_eq!(sent.meta_str("intent"), Some("set_knowledge_base_context"));
        assert!(!state.has_pending(AgentName::Router));
    }

    #[tokio::test]
    async fn test_router_direct_response_for_inquiry() {
        let (ctx, _) = keyword_context(ScriptedModel::new("")).await;
        let router = Router::from_context(&ctx);
        let mut state = SharedState::new();
        state.post(AgentMessage::new(
            AgentName::UserProxy,
            AgentName::Router,
            MessageType::WorkRequest,
            "User request: can you explain how this works",
        ));

        router.process(&mut state, &ctx).await.unwrap();

        assert_eq!(state.current_agent, Some(AgentName::UserProxy));
        let sent = state.latest_pending(AgentName::UserProxy).unwrap();
        assert_eq!(sent.message_type, MessageType::DirectResponseRequest);
    }
}
