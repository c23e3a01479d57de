#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::agents::{AgentMessage, AgentName, ChatRole, MessageType, SharedState};
    use crate::error::StateError;
    use crate::state::{
        ChangeType, ConversationState, MemoryStateStore, SessionContext, SessionStore,
        SessionUpdate, normalize_confidence,
    };

    const SESSION: &str = "session-under-test";

    #[test]
    fn test_session_context_validate() {
        let mut context = SessionContext::new(SESSION);
        assert!(context.validate().is_ok());

        context.intent_confidence = Some(1.5);
        assert!(matches!(
            context.validate(),
            Err(StateError::Validation(_))
        ));

        context.intent_confidence = Some(0.8);
        context.session_id = "  ".to_string();
        assert!(context.validate().is_err());
    }

    #[test]
    fn test_session_update_reports_only_changed_fields() {
        let mut context = SessionContext::new(SESSION);
        context.knowledge_base_id = Some("1".to_string());

        let update = SessionUpdate {
            knowledge_base_id: Some("1".to_string()),
            user_intent: Some("create_content".to_string()),
            ..Default::default()
        };
        let changes = update.apply(&mut context);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "session.user_intent");
        assert_eq!(changes[0].old_value, Value::Null);
        assert_eq!(changes[0].new_value, json!("create_content"));
        assert_eq!(context.user_intent.as_deref(), Some("create_content"));
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(85.0), 0.85);
        assert_eq!(normalize_confidence(0.4), 0.4);
        assert_eq!(normalize_confidence(250.0), 1.0);
    }

    #[test]
    fn test_conversation_state_round_trip_names() {
        assert_eq!(
            "completed".parse::<ConversationState>().unwrap(),
            ConversationState::Completed
        );
        assert_eq!(ConversationState::Waiting.to_string(), "waiting");
        assert!("paused".parse::<ConversationState>().is_err());
    }

    #[tokio::test]
    async fn test_initialize_session_is_idempotent() {
        let store = MemoryStateStore::new();
        let first = store
            .initialize_session(SESSION, Some("3".to_string()))
            .await
            .unwrap();
        assert_eq!(first.knowledge_base_id.as_deref(), Some("3"));

        store.set_active(SESSION, false).await.unwrap();
        let second = store.initialize_session(SESSION, None).await.unwrap();
        assert_eq!(second.knowledge_base_id.as_deref(), Some("3"));

        let summary = store.get_state_summary(SESSION).await.unwrap();
        assert!(summary.is_active);
    }

    #[tokio::test]
    async fn test_update_session_context_audits_and_validates() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, None).await.unwrap();

        store
            .update_session_context(
                SESSION,
                "Router",
                SessionUpdate {
                    user_intent: Some("search_content".to_string()),
                    intent_confidence: Some(0.7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let invalid = store
            .update_session_context(
                SESSION,
                "Router",
                SessionUpdate {
                    intent_confidence: Some(7.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(invalid.is_err());

        let context = store.get_session_context(SESSION).await.unwrap().unwrap();
        assert_eq!(context.intent_confidence, Some(0.7));

        let trail = store.get_audit_trail(SESSION, 10).await.unwrap();
        let updates: Vec<_> = trail
            .iter()
            .filter(|e| e.change_type == ChangeType::Update)
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|e| e.agent_name.as_deref() == Some("Router")));
        assert_eq!(updates[0].correlation_id, updates[1].correlation_id);
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_not_found() {
        let store = MemoryStateStore::new();
        let result = store
            .update_session_context("missing", "System", SessionUpdate::default())
            .await;
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_conversation_history_is_oldest_first_from_newest_limit() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, None).await.unwrap();

        for i in 1..=5 {
            let order = store
                .add_conversation_message(SESSION, "user", &format!("message {}", i), None, json!({}))
                .await
                .unwrap();
            assert_eq!(order, i);
        }

        let history = store.get_conversation_history(SESSION, 3).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["message 3", "message 4", "message 5"]);
    }

    #[tokio::test]
    async fn test_agent_switch_is_audited() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, None).await.unwrap();

        let mut state = SharedState::new();
        state.current_agent = Some(AgentName::Supervisor);
        store.merge_state(SESSION, &state, "Supervisor").await.unwrap();

        let snapshot = store.get_agent_snapshot(SESSION).await.unwrap().unwrap();
        assert_eq!(snapshot.current_agent, AgentName::Supervisor);
        assert!(snapshot.last_agent_switch.is_some());

        let trail = store.get_audit_trail(SESSION, 5).await.unwrap();
        assert_eq!(trail[0].change_type, ChangeType::AgentSwitch);
        assert_eq!(trail[0].new_value, Some(json!("Supervisor")));
    }

    #[tokio::test]
    async fn test_merge_then_load_state() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, None).await.unwrap();

        let mut state = SharedState::new();
        state.knowledge_base_id = Some("1".to_string());
        state.knowledge_base_name = Some("Rust".to_string());
        state.user_intent = Some("set_knowledge_base_context".to_string());
        state.intent_confidence = Some(80.0);
        state.recursions = 9;
        state.post(AgentMessage::new(
            AgentName::Supervisor,
            AgentName::UserProxy,
            MessageType::WorkflowComplete,
            "done",
        ));
        state.mark_all_processed();
        state.current_agent = Some(AgentName::UserProxy);

        store.merge_state(SESSION, &state, "System").await.unwrap();

        let context = store.get_session_context(SESSION).await.unwrap().unwrap();
        assert_eq!(context.knowledge_base_id.as_deref(), Some("1"));
        assert_eq!(context.intent_confidence, Some(0.8));

        store
            .add_conversation_message(SESSION, "user", "use kb 1", None, json!({}))
            .await
            .unwrap();
        store
            .add_conversation_message(SESSION, "assistant", "Switched.", Some("UserProxy"), json!({}))
            .await
            .unwrap();
        let history = store.get_conversation_history(SESSION, 50).await.unwrap();

        let loaded = store.load_state(SESSION, &history).await.unwrap();
        assert_eq!(loaded.recursions, 0);
        assert_eq!(loaded.current_agent, Some(AgentName::UserProxy));
        assert_eq!(loaded.knowledge_base_id.as_deref(), Some("1"));
        assert_eq!(loaded.knowledge_base_name.as_deref(), Some("Rust"));
        assert_eq!(loaded.intent_confidence, Some(80.0));
        assert_eq!(loaded.agent_messages.len(), 1);
        assert!(!loaded.has_pending(AgentName::UserProxy));
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_set_conversation_state_completed() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, None).await.unwrap();
        let context = store
            .set_conversation_state(SESSION, "System", ConversationState::Completed)
            .await
            .unwrap();
        assert_eq!(context.conversation_state, ConversationState::Completed);
    }

    #[tokio::test]
    async fn test_clear_session_keeps_audit_trail() {
        let store = MemoryStateStore::new();
        store.initialize_session(SESSION, Some("2".to_string())).await.unwrap();
        store
            .add_conversation_message(SESSION, "user", "hello", None, json!({}))
            .await
            .unwrap();

        store.clear_session(SESSION).await.unwrap();

        let summary = store.get_state_summary(SESSION).await.unwrap();
        assert!(!summary.is_active);
        assert_eq!(summary.message_count, 0);
        assert!(summary.change_count >= 3);
        assert_eq!(
            summary.session_context.unwrap().knowledge_base_id,
            None
        );

        let trail = store.get_audit_trail(SESSION, 1).await.unwrap();
        assert_eq!(trail[0].change_type, ChangeType::Delete);
    }

    #[tokio::test]
    async fn test_summary_of_unknown_session() {
        let store = MemoryStateStore::new();
        let summary = store.get_state_summary("nobody").await.unwrap();
        assert!(!summary.is_active);
        assert!(summary.session_context.is_none());
        assert_eq!(summary.message_count, 0);
    }
}
