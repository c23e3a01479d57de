#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rig::tool::Tool;

    use crate::agents::AgentName;
    use crate::knowledge_base::{
        KnowledgeBaseRepository, MemoryKnowledgeBase, NewArticle, NewKnowledgeBase,
    };
    use crate::llm::tools::knowledge_base::{InsertArticleArgs, KnowledgeBaseArgs, SearchArgs};
    use crate::llm::tools::gitlab::ListIssuesArgs;
    use crate::llm::tools::{
        AgentToolHierarchy, AgentToolInsertArticle, AgentToolListIssues, AgentToolSearchArticles,
        AgentToolSetContext, AgentToolbox, ContextChange, parameters_for,
    };

    async fn toolbox_with_kb() -> (AgentToolbox, i64) {
        let repo = Arc::new(MemoryKnowledgeBase::new());
        let kb = repo
            .insert_knowledge_base(NewKnowledgeBase {
                name: "Cooking".to_string(),
                description: "Recipes".to_string(),
                author_id: 1,
                gitlab_project_id: None,
            })
            .await
            .unwrap();
        let toolbox = AgentToolbox::new(repo, None, None, AgentName::ContentManagement);
        (toolbox, kb.id)
    }

    #[tokio::test]
    async fn test_set_context_records_change() {
        let (toolbox, kb_id) = toolbox_with_kb().await;
        let tool = AgentToolSetContext::new(toolbox.clone());

        let reply = tool
            .call(KnowledgeBaseArgs {
                knowledge_base_id: kb_id,
            })
            .await
            .unwrap();
        assert!(reply.contains("Cooking"));

        let effects = toolbox.take_effects();
        assert_eq!(effects.len(), 1);
        assert_eq!(
            effects[0].context,
            Some(ContextChange::KnowledgeBase {
                id: kb_id,
                name: "Cooking".to_string()
            })
        );
        assert!(toolbox.take_effects().is_empty());
    }

    #[tokio::test]
    async fn test_set_context_unknown_kb_fails() {
        let (toolbox, _) = toolbox_with_kb().await;
        let tool = AgentToolSetContext::new(toolbox.clone());
        let err = tool
            .call(KnowledgeBaseArgs {
                knowledge_base_id: 999,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("999"));
        assert!(toolbox.take_effects().is_empty());
    }

    #[tokio::test]
    async fn test_insert_then_search_and_hierarchy() {
        let (toolbox, kb_id) = toolbox_with_kb().await;

        AgentToolInsertArticle::new(toolbox.clone())
            .call(InsertArticleArgs {
                knowledge_base_id: kb_id,
                article: NewArticle::new("Knife Skills", "How to hold a chef's knife"),
            })
            .await
            .unwrap();

        let found = AgentToolSearchArticles::new(toolbox.clone())
            .call(SearchArgs {
                knowledge_base_id: kb_id,
                query: "knife".to_string(),
            })
            .await
            .unwrap();
        assert!(found.contains("Knife Skills"));

        let tree = AgentToolHierarchy::new(toolbox.clone())
            .call(KnowledgeBaseArgs {
                knowledge_base_id: kb_id,
            })
            .await
            .unwrap();
        assert!(tree.starts_with("- ["));
        assert_eq!(toolbox.effect_summaries().len(), 3);
    }

    #[tokio::test]
    async fn test_gitlab_tools_without_client() {
        let (toolbox, _) = toolbox_with_kb().await;
        let err = AgentToolListIssues::new(toolbox)
            .call(ListIssuesArgs {
                project_id: Some("7".to_string()),
                labels: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "GitLab not configured");
    }

    #[tokio::test]
    async fn test_repository_tree_tool_lists_entries() {
        use crate::gitlab::GitLabClient;
        use crate::llm::tools::AgentToolRepositoryTree;
        use crate::llm::tools::gitlab::RepositoryTreeArgs;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/repository/tree"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "a1", "name": "docs", "type": "tree", "path": "docs"},
                {"id": "b2", "name": "README.md", "type": "blob", "path": "README.md"}
            ])))
            .mount(&server)
            .await;

        let gitlab = Arc::new(GitLabClient::new(&server.uri(), "glpat-test").unwrap());
        let toolbox = AgentToolbox::new(
            Arc::new(MemoryKnowledgeBase::new()),
            Some(gitlab),
            Some("7".to_string()),
            AgentName::ContentPlanner,
        );
        let output = AgentToolRepositoryTree::new(toolbox.clone())
            .call(RepositoryTreeArgs {
                project_id: None,
                path: String::new(),
                git_ref: "main".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(output, "📁 docs\n📄 README.md");
        assert_eq!(toolbox.effect_summaries(), vec!["list_repository_tree: 2 entries"]);
    }

    #[test]
    fn test_parameters_strip_schema_header() {
        let params = parameters_for::<SearchArgs>();
        assert!(params.get("$schema").is_none());
        assert!(params.get("title").is_none());
        assert_eq!(params["type"], "object");
        assert!(params["properties"]["query"].is_object());
    }
}
