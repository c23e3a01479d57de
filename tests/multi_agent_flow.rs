use std::sync::Arc;

use kb_agents::agents::{AgentContext, AgentName, MessageType};
use kb_agents::config::{ClassifierStrategy, Config};
use kb_agents::knowledge_base::{KnowledgeBaseRepository, MemoryKnowledgeBase};
use kb_agents::llm::ScriptedModel;
use kb_agents::orchestrator::Orchestrator;
use kb_agents::state::{ConversationState, MemoryStateStore, SessionStore};

const PLAN: &str = "STRATEGY: introduce ownership to new Rust developers\nHIERARCHY:\n- Ownership\n- Borrowing\nIMPLEMENTATION PLAN:\n1. Ownership\n2. Borrowing";

fn articles() -> String {
    let body = |topic: &str| format!("{} explained in depth. ", topic).repeat(10);
    format!(
        "---ARTICLE START---\nTITLE: Ownership\nCONTENT: {}\n---ARTICLE END---\n\n---ARTICLE START---\nTITLE: Borrowing\nCONTENT: {}\n---ARTICLE END---",
        body("Ownership"),
        body("Borrowing")
    )
}

fn keyword_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.classifier = ClassifierStrategy::Keyword;
    config.llm.retry_attempts = 1;
    config.llm.retry_delay_ms = 0;
    config
}

async fn setup(
    model: ScriptedModel,
    config: Config,
) -> (Orchestrator, Arc<MemoryStateStore>, Arc<MemoryKnowledgeBase>) {
    let store = Arc::new(MemoryStateStore::new());
    let kb = Arc::new(MemoryKnowledgeBase::new());
    let ctx = AgentContext::new(Arc::new(model), kb.clone(), None, Arc::new(config));
    let orchestrator = Orchestrator::new(store.clone(), ctx);
    orchestrator.initialize().await.unwrap();
    (orchestrator, store, kb)
}

#[tokio::test]
async fn test_use_kb_sets_context_and_persists() {
    let (orchestrator, store, _) = setup(ScriptedModel::new(""), keyword_config()).await;

    let reply = orchestrator.process_message("use kb 1", "user").await.unwrap();

    assert_eq!(
        reply,
        "✅ Knowledge base context set to: Demo Knowledge Base (ID: 1)"
    );
    let context = store
        .get_session_context(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.knowledge_base_id.as_deref(), Some("1"));
    assert_eq!(context.user_intent.as_deref(), Some("set_knowledge_base_context"));
    assert_eq!(context.conversation_state, ConversationState::Active);

    let snapshot = store
        .get_agent_snapshot(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.current_agent, AgentName::UserProxy);
}

#[tokio::test]
async fn test_create_content_flow_writes_articles() {
    let model = ScriptedModel::new("")
        .when("You are the ContentPlanner agent", PLAN)
        .when("You are the ContentCreator agent", articles())
        .when(
            "You are the ContentReviewer agent",
            "The articles are clear and accurate. Approved.",
        );
    let (orchestrator, _, kb) = setup(model, keyword_config()).await;

    let reply = orchestrator
        .process_message("create a new article about rust", "user")
        .await
        .unwrap();

    assert!(
        reply.starts_with("📝 Created 2 articles in Demo Knowledge Base (ID: 1): Ownership, Borrowing"),
        "{}",
        reply
    );
    let titles: Vec<String> = kb
        .get_root_level_articles(1)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Ownership".to_string()));
}

#[tokio::test]
async fn test_revised_retrieval_is_delivered_after_max_revisions() {
    let (orchestrator, store, _) = setup(ScriptedModel::new(""), keyword_config()).await;

    let reply = orchestrator
        .process_message("show all articles", "user")
        .await
        .unwrap();

    assert!(
        reply.starts_with("📚 Articles in Demo Knowledge Base"),
        "{}",
        reply
    );
    assert!(!reply.contains("Session Reset"));

    let snapshot = store
        .get_agent_snapshot(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    let revisions = snapshot
        .agent_messages
        .iter()
        .filter(|m| m.message_type == MessageType::RevisionRequest)
        .count();
    assert_eq!(revisions, 2);
    assert_eq!(snapshot.current_agent, AgentName::UserProxy);
}

#[tokio::test]
async fn test_endless_revisions_hit_recursion_limit() {
    let model = ScriptedModel::new("")
        .when("You are the ContentPlanner agent", PLAN)
        .when("You are the ContentCreator agent", articles())
        .when(
            "You are the ContentReviewer agent",
            "This needs improvement: the depth is lacking.",
        );
    let mut config = keyword_config();
    config.orchestrator.max_revisions = 1000;
    let (orchestrator, store, _) = setup(model, config).await;

    let reply = orchestrator
        .process_message("create a new article about rust", "user")
        .await
        .unwrap();

    assert!(reply.starts_with("⚠️"), "{}", reply);
    let context = store
        .get_session_context(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.conversation_state, ConversationState::Completed);
    let snapshot = store
        .get_agent_snapshot(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.recursions, 50);

    // 下一条消息会重新激活会话
    orchestrator.process_message("use kb 1", "user").await.unwrap();
    let context = store
        .get_session_context(orchestrator.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.conversation_state, ConversationState::Active);
}
