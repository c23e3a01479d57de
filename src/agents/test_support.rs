//! 单元测试共用的上下文构造

use std::sync::Arc;

use crate::agents::AgentContext;
use crate::config::{ClassifierStrategy, Config};
use crate::knowledge_base::{KnowledgeBaseRepository, MemoryKnowledgeBase, NewKnowledgeBase};
use crate::llm::ScriptedModel;

pub fn test_config(classifier: ClassifierStrategy) -> Config {
    let mut config = Config::default();
    config.orchestrator.classifier = classifier;
    config.llm.retry_attempts = 1;
    config.llm.retry_delay_ms = 0;
    config
}

pub fn context_with(model: ScriptedModel, config: Config) -> (AgentContext, Arc<MemoryKnowledgeBase>) {
    let kb = Arc::new(MemoryKnowledgeBase::new());
    let ctx = AgentContext::new(Arc::new(model), kb.clone(), None, Arc::new(config));
    (ctx, kb)
}

/// 关键词分类器、空知识库
pub async fn keyword_context(model: ScriptedModel) -> (AgentContext, Arc<MemoryKnowledgeBase>) {
    context_with(model, test_config(ClassifierStrategy::Keyword))
}

pub async fn add_kb(kb: &MemoryKnowledgeBase, name: &str) -> i64 {
    kb.insert_knowledge_base(NewKnowledgeBase {
        name: name.to_string(),
        description: format!("{} description", name),
        author_id: 1,
        gitlab_project_id: None,
    })
    .await
    .unwrap()
    .id
}
