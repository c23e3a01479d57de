#[cfg(test)]
mod tests {
    use crate::error::KnowledgeBaseError;
    use crate::knowledge_base::{
        ArticleNode, ArticleUpdate, KnowledgeBaseRepository, MemoryKnowledgeBase, NewArticle,
        NewKnowledgeBase, normalize_tag_name, render_hierarchy,
    };

    fn new_kb(name: &str) -> NewKnowledgeBase {
        NewKnowledgeBase {
            name: name.to_string(),
            description: format!("{} description", name),
            author_id: 1,
            gitlab_project_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_knowledge_bases() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("  Rust Guide ")).await.unwrap();
        assert_eq!(kb.name, "Rust Guide");
        assert!(kb.is_active);

        let all = repo.get_knowledge_bases().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            repo.get_knowledge_base_by_id(kb.id).await.unwrap(),
            Some(kb)
        );
    }

    #[tokio::test]
    async fn test_inactive_knowledge_bases_are_hidden() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("Archive")).await.unwrap();
        repo.update_knowledge_base(
            kb.id,
            crate::knowledge_base::KnowledgeBaseUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(repo.get_knowledge_bases().await.unwrap().is_empty());
        assert!(repo.get_knowledge_base_by_id(kb.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_name_is_rejected() {
        let repo = MemoryKnowledgeBase::new();
        let result = repo.insert_knowledge_base(new_kb("   ")).await;
        assert!(matches!(result, Err(KnowledgeBaseError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_article_hierarchy_is_depth_first() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("Cooking")).await.unwrap();

        let basics = repo
            .insert_article(kb.id, NewArticle::new("Basics", "Knife skills and prep"))
            .await
            .unwrap();
        let advanced = repo
            .insert_article(kb.id, NewArticle::new("Advanced", "Sous vide and more"))
            .await
            .unwrap();
        let knives = repo
            .insert_article(
                kb.id,
                NewArticle::new("Knives", "Choosing a chef's knife").with_parent(basics.id),
            )
            .await
            .unwrap();

        let nodes = repo.get_article_hierarchy(kb.id).await.unwrap();
        let order: Vec<(i64, i32)> = nodes.iter().map(|n| (n.id, n.depth)).collect();
        assert_eq!(order, vec![(basics.id, 0), (knives.id, 1), (advanced.id, 0)]);

        let rendered = render_hierarchy(&nodes);
        assert!(rendered.contains(&format!("- [{}] Basics", basics.id)));
        assert!(rendered.contains(&format!("  - [{}] Knives", knives.id)));

        let roots = repo.get_root_level_articles(kb.id).await.unwrap();
        assert_eq!(roots.len(), 2);
        let children = repo
            .get_articles_by_parent_ids(kb.id, &[basics.id])
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "Knives");
    }

    #[tokio::test]
    async fn test_insert_article_requires_existing_kb_and_parent() {
        let repo = MemoryKnowledgeBase::new();
        let missing = repo
            .insert_article(42, NewArticle::new("Orphan", "No home"))
            .await;
        assert!(matches!(
            missing,
            Err(KnowledgeBaseError::KnowledgeBaseNotFound(42))
        ));

        let kb = repo.insert_knowledge_base(new_kb("Garden")).await.unwrap();
        let bad_parent = repo
            .insert_article(kb.id, NewArticle::new("Tomatoes", "Stake them").with_parent(999))
            .await;
        assert!(matches!(
            bad_parent,
            Err(KnowledgeBaseError::ArticleNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_update_and_search_articles() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("Rust")).await.unwrap();
        let article = repo
            .insert_article(kb.id, NewArticle::new("Ownership", "Borrowing rules"))
            .await
            .unwrap();
        repo.insert_article(kb.id, NewArticle::new("Traits", "Generic bounds"))
            .await
            .unwrap();

        let updated = repo
            .update_article(
                kb.id,
                article.id,
                ArticleUpdate {
                    content: Some("Borrowing and LIFETIMES".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Ownership");
        assert_eq!(updated.content, "Borrowing and LIFETIMES");

        let hits = repo.search_articles(kb.id, "lifetimes").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, article.id);

        let by_title = repo.search_articles(kb.id, "TRAIT").await.unwrap();
        assert_eq!(by_title.len(), 1);

        let wrong_kb = repo
            .update_article(kb.id + 100, article.id, ArticleUpdate::default())
            .await;
        assert!(wrong_kb.is_err());
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        use crate::knowledge_base::postgres::contains_pattern;

        assert_eq!(contains_pattern(" ownership "), "%ownership%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("snake_case"), "%snake\\_case%");
        assert_eq!(contains_pattern(r"C:\temp"), r"%C:\\temp%");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("Naming")).await.unwrap();
        let snake = repo
            .insert_article(kb.id, NewArticle::new("snake_case names", "Use them for functions"))
            .await
            .unwrap();
        repo.insert_article(kb.id, NewArticle::new("snakeXcase", "Not a convention"))
            .await
            .unwrap();

        let hits = repo.search_articles(kb.id, "snake_case").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, snake.id);
        assert!(repo.search_articles(kb.id, "100%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_normalized_and_counted() {
        let repo = MemoryKnowledgeBase::new();
        let kb = repo.insert_knowledge_base(new_kb("Tagged")).await.unwrap();
        let a = repo
            .insert_article(kb.id, NewArticle::new("A", "aaa"))
            .await
            .unwrap();
        let b = repo
            .insert_article(kb.id, NewArticle::new("B", "bbb"))
            .await
            .unwrap();

        let tag = repo.insert_tag(kb.id, "  Async ").await.unwrap();
        assert_eq!(tag.name, "async");
        let again = repo.insert_tag(kb.id, "ASYNC").await.unwrap();
        assert_eq!(tag.id, again.id);
        let other = repo.insert_tag(kb.id, "errors").await.unwrap();

        repo.tag_article(a.id, tag.id).await.unwrap();
        repo.tag_article(b.id, tag.id).await.unwrap();
        repo.tag_article(b.id, tag.id).await.unwrap();

        let tags = repo.get_tags(kb.id).await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag.name, "async");
        assert_eq!(tags[0].usage_count, 2);
        assert_eq!(tags[1].tag.id, other.id);
        assert_eq!(tags[1].usage_count, 0);
    }

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name(" Rust ").unwrap(), "rust");
        assert!(normalize_tag_name("   ").is_err());
    }

    #[test]
    fn test_render_empty_hierarchy() {
        let nodes: Vec<ArticleNode> = Vec::new();
        assert_eq!(render_hierarchy(&nodes), "(no articles yet)");
    }
}
