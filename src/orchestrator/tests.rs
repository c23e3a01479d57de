#[cfg(test)]
mod tests {
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    use crate::agents::test_support::{add_kb, context_with, test_config};
    use crate::agents::{AgentContext, AgentMessage, AgentName, MessageType, SharedState};
    use crate::config::ClassifierStrategy;
    use crate::knowledge_base::{KnowledgeBaseRepository, MemoryKnowledgeBase};
    use crate::llm::{ChatModel, ScriptedModel};
    use crate::orchestrator::routing::{
        route_from_planner, route_from_router, route_from_user_proxy,
    };
    use crate::orchestrator::{Orchestrator, Route, TerminationReason};
    use crate::state::{ConversationState, MemoryStateStore, SessionStore};

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            Err(anyhow!("model unavailable"))
        }
    }

    fn pending_for(agent: AgentName) -> SharedState {
        let mut state = SharedState::new();
        state.post(AgentMessage::new(
            AgentName::UserProxy,
            agent,
            MessageType::WorkRequest,
            "work",
        ));
        state.current_agent = Some(agent);
        state
    }

    fn orchestrator(ctx: AgentContext) -> (Orchestrator, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        (Orchestrator::new(store.clone(), ctx), store)
    }

    async fn conversation_state(store: &MemoryStateStore, session_id: &str) -> ConversationState {
        store
            .get_session_context(session_id)
            .await
            .unwrap()
            .unwrap()
            .conversation_state
    }

    #[test]
    fn test_user_proxy_routes_to_router() {
        let decision = route_from_user_proxy(&pending_for(AgentName::Router), 50);
        assert_eq!(decision.route, Route::Next(AgentName::Router));
        assert!(!decision.mark_completed);
    }

    #[test]
    fn test_user_proxy_without_pending_ends() {
        let mut state = SharedState::new();
        state.current_agent = Some(AgentName::UserProxy);
        let decision = route_from_user_proxy(&state, 50);
        assert_eq!(
            decision.route,
            Route::End(TerminationReason::NoPendingMessage(AgentName::UserProxy))
        );
    }

    #[test]
    fn test_recursion_limit_marks_completed() {
        let mut state = pending_for(AgentName::Router);
        state.recursions = 50;
        let decision = route_from_user_proxy(&state, 50);
        assert_eq!(decision.route, Route::End(TerminationReason::RecursionLimit));
        assert!(decision.mark_completed);
    }

    #[test]
    fn test_completed_session_ends_turn() {
        let mut state = pending_for(AgentName::Router);
        state
            .session_data
            .insert("conversation_state".to_string(), json!("completed"));
        let decision = route_from_user_proxy(&state, 50);
        assert_eq!(decision.route, Route::End(TerminationReason::SessionCompleted));
    }

    #[test]
    fn test_router_requires_pending_message() {
        let mut state = SharedState::new();
        state.current_agent = Some(AgentName::ContentManagement);
        assert_eq!(
            route_from_router(&state, 50).route,
            Route::End(TerminationReason::NoPendingMessage(
                AgentName::ContentManagement
            ))
        );

        state.current_agent = Some(AgentName::Supervisor);
        assert_eq!(
            route_from_router(&state, 50).route,
            Route::Next(AgentName::Supervisor)
        );
    }

    #[test]
    fn test_planner_without_destination_is_unrouted() {
        let mut state = SharedState::new();
        state.current_agent = Some(AgentName::ContentPlanner);
        assert_eq!(
            route_from_planner(&state, 50).route,
            Route::End(TerminationReason::Unrouted(Some(AgentName::ContentPlanner)))
        );
    }

    #[tokio::test]
    async fn test_initialize_creates_demo_knowledge_base() {
        let (ctx, kb) = context_with(ScriptedModel::new(""), test_config(ClassifierStrategy::Keyword));
        let (orchestrator, store) = orchestrator(ctx);

        orchestrator.initialize().await.unwrap();

        let kbs = kb.get_knowledge_bases().await.unwrap();
        assert_eq!(kbs.len(), 1);
        assert_eq!(kbs[0].name, "Demo Knowledge Base");
        let context = store
            .get_session_context(orchestrator.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.knowledge_base_id, Some(kbs[0].id.to_string()));
    }

    #[tokio::test]
    async fn test_switch_knowledge_base() {
        let (ctx, kb) = context_with(ScriptedModel::new(""), test_config(ClassifierStrategy::Keyword));
        let (orchestrator, store) = orchestrator(ctx);
        orchestrator.initialize().await.unwrap();
        let id = add_kb(&kb, "Rust").await;

        let reply = orchestrator
            .process_message(&format!("use kb {}", id), "user")
            .await
            .unwrap();

        assert_eq!(
            reply,
            format!("✅ Knowledge base context set to: Rust (ID: {})", id)
        );
        let context = store
            .get_session_context(orchestrator.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.knowledge_base_id, Some(id.to_string()));
        let snapshot = store
            .get_agent_snapshot(orchestrator.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.current_agent, AgentName::UserProxy);
        let history = store
            .get_conversation_history(orchestrator.session_id(), 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_agent_failure_sets_error_state_then_recovers() {
        let config = Arc::new(test_config(ClassifierStrategy::Keyword));
        let kb = Arc::new(MemoryKnowledgeBase::new());
        let ctx = AgentContext::new(Arc::new(FailingModel), kb, None, config);
        let (orchestrator, store) = orchestrator(ctx);
        orchestrator.initialize().await.unwrap();

        let reply = orchestrator
            .process_message("create a new article about rust", "user")
            .await
            .unwrap();
        assert!(reply.starts_with("❌ Error processing message"), "{}", reply);
        assert_eq!(
            conversation_state(&store, orchestrator.session_id()).await,
            ConversationState::Error
        );

        let reply = orchestrator.process_message("use kb 1", "user").await.unwrap();
        assert!(reply.starts_with("✅"), "{}", reply);
        assert_eq!(
            conversation_state(&store, orchestrator.session_id()).await,
            ConversationState::Active
        );
    }

    #[tokio::test]
    async fn test_clear_conversation_keeps_knowledge_base() {
        let (ctx, _) = context_with(ScriptedModel::new(""), test_config(ClassifierStrategy::Keyword));
        let (mut orchestrator, store) = orchestrator(ctx);
        orchestrator.initialize().await.unwrap();
        let first = orchestrator.session_id().to_string();

        orchestrator.clear_conversation_state().await.unwrap();

        assert_ne!(orchestrator.session_id(), first);
        let context = store
            .get_session_context(orchestrator.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.knowledge_base_name.as_deref(), Some("Demo Knowledge Base"));
    }
}
