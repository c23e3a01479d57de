//! 进程内知识库存储，用于 `--memory` 模式与测试

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use super::{
    Article, ArticleNode, ArticleUpdate, KbResult, KnowledgeBase, KnowledgeBaseRepository,
    KnowledgeBaseUpdate, NewArticle, NewKnowledgeBase, Tag, TagWithUsage, build_hierarchy,
    normalize_tag_name,
};
use crate::error::KnowledgeBaseError;

#[derive(Default)]
struct Inner {
    next_id: i64,
    knowledge_bases: BTreeMap<i64, KnowledgeBase>,
    articles: BTreeMap<i64, Article>,
    tags: BTreeMap<i64, Tag>,
    article_tags: BTreeSet<(i64, i64)>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_kb(&self, id: i64) -> KbResult<()> {
        if self.knowledge_bases.contains_key(&id) {
            Ok(())
        } else {
            Err(KnowledgeBaseError::KnowledgeBaseNotFound(id))
        }
    }
}

/// 内存知识库
#[derive(Default)]
pub struct MemoryKnowledgeBase {
    inner: RwLock<Inner>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeBaseRepository for MemoryKnowledgeBase {
    async fn ensure_schema(&self) -> KbResult<()> {
        Ok(())
    }

    async fn get_knowledge_bases(&self) -> KbResult<Vec<KnowledgeBase>> {
        let inner = self.inner.read().await;
        Ok(inner
            .knowledge_bases
            .values()
            .filter(|kb| kb.is_active)
            .cloned()
            .collect())
    }

    async fn get_knowledge_base_by_id(&self, id: i64) -> KbResult<Option<KnowledgeBase>> {
        let inner = self.inner.read().await;
        Ok(inner.knowledge_bases.get(&id).cloned())
    }

    async fn insert_knowledge_base(&self, kb: NewKnowledgeBase) -> KbResult<KnowledgeBase> {
        if kb.name.trim().is_empty() {
            return Err(KnowledgeBaseError::Invalid(
                "knowledge base name cannot be empty".to_string(),
            ));
        }
        let mut inner = self.inner.write().await;
        let id = inner.allocate_id();
        let created = KnowledgeBase {
            id,
            name: kb.name.trim().to_string(),
            description: kb.description,
            author_id: kb.author_id,
            is_active: true,
            gitlab_project_id: kb.gitlab_project_id,
        };
        inner.knowledge_bases.insert(id, created.clone());
        Ok(created)
    }

    async fn update_knowledge_base(
        &self,
        id: i64,
        update: KnowledgeBaseUpdate,
    ) -> KbResult<KnowledgeBase> {
        let mut inner = self.inner.write().await;
        let kb = inner
            .knowledge_bases
            .get_mut(&id)
            .ok_or(KnowledgeBaseError::KnowledgeBaseNotFound(id))?;
        if let Some(name) = update.name {
            kb.name = name;
        }
        if let Some(description) = update.description {
            kb.description = description;
        }
        if let Some(is_active) = update.is_active {
            kb.is_active = is_active;
        }
        if update.gitlab_project_id.is_some() {
            kb.gitlab_project_id = update.gitlab_project_id;
        }
        Ok(kb.clone())
    }

    async fn get_article_hierarchy(&self, knowledge_base_id: i64) -> KbResult<Vec<ArticleNode>> {
        let inner = self.inner.read().await;
        let articles: Vec<Article> = inner
            .articles
            .values()
            .filter(|a| a.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect();
        Ok(build_hierarchy(&articles, "system"))
    }

    async fn get_root_level_articles(&self, knowledge_base_id: i64) -> KbResult<Vec<Article>> {
        let inner = self.inner.read().await;
        Ok(inner
            .articles
            .values()
            .filter(|a| a.knowledge_base_id == knowledge_base_id && a.parent_id.is_none())
            .cloned()
            .collect())
    }

    async fn get_articles_by_parent_ids(
        &self,
        knowledge_base_id: i64,
        parent_ids: &[i64],
    ) -> KbResult<Vec<Article>> {
        let inner = self.inner.read().await;
        Ok(inner
            .articles
            .values()
            .filter(|a| {
                a.knowledge_base_id == knowledge_base_id
                    && a.parent_id.is_some_and(|p| parent_ids.contains(&p))
            })
            .cloned()
            .collect())
    }

    async fn get_article_by_id(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
    ) -> KbResult<Option<Article>> {
        let inner = self.inner.read().await;
        Ok(inner
            .articles
            .get(&article_id)
            .filter(|a| a.knowledge_base_id == knowledge_base_id)
            .cloned())
    }

    async fn insert_article(
        &self,
        knowledge_base_id: i64,
        article: NewArticle,
    ) -> KbResult<Article> {
        article.validate()?;
        let mut inner = self.inner.write().await;
        inner.require_kb(knowledge_base_id)?;
        if let Some(parent_id) = article.parent_id
            && !inner.articles.contains_key(&parent_id)
        {
            return Err(KnowledgeBaseError::ArticleNotFound(parent_id));
        }
        let id = inner.allocate_id();
        let created = Article {
            id,
            knowledge_base_id,
            title: article.title.trim().to_string(),
            content: article.content,
            author_id: article.author_id,
            parent_id: article.parent_id,
        };
        inner.articles.insert(id, created.clone());
        Ok(created)
    }

    async fn update_article(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
        update: ArticleUpdate,
    ) -> KbResult<Article> {
        let mut inner = self.inner.write().await;
        let article = inner
            .articles
            .get_mut(&article_id)
            .filter(|a| a.knowledge_base_id == knowledge_base_id)
            .ok_or(KnowledgeBaseError::ArticleNotFound(article_id))?;
        if let Some(title) = update.title {
            article.title = title;
        }
        if let Some(content) = update.content {
            article.content = content;
        }
        if update.parent_id.is_some() {
            article.parent_id = update.parent_id;
        }
        Ok(article.clone())
    }

    async fn search_articles(&self, knowledge_base_id: i64, query: &str) -> KbResult<Vec<Article>> {
        let needle = query.trim().to_lowercase();
        let inner = self.inner.read().await;
        Ok(inner
            .articles
            .values()
            .filter(|a| a.knowledge_base_id == knowledge_base_id)
            .filter(|a| {
                a.title.to_lowercase().contains(&needle)
                    || a.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn get_tags(&self, knowledge_base_id: i64) -> KbResult<Vec<TagWithUsage>> {
        let inner = self.inner.read().await;
        let mut tags: Vec<TagWithUsage> = inner
            .tags
            .values()
            .filter(|t| t.knowledge_base_id == knowledge_base_id)
            .map(|t| TagWithUsage {
                tag: t.clone(),
                usage_count: inner
                    .article_tags
                    .iter()
                    .filter(|(_, tag_id)| *tag_id == t.id)
                    .count() as i64,
            })
            .collect();
        tags.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.tag.name.cmp(&b.tag.name))
        });
        Ok(tags)
    }

    async fn insert_tag(&self, knowledge_base_id: i64, name: &str) -> KbResult<Tag> {
        let name = normalize_tag_name(name)?;
        let mut inner = self.inner.write().await;
        inner.require_kb(knowledge_base_id)?;
        if let Some(existing) = inner
            .tags
            .values()
            .find(|t| t.knowledge_base_id == knowledge_base_id && t.name == name)
        {
            return Ok(existing.clone());
        }
        let id = inner.allocate_id();
        let tag = Tag {
            id,
            name,
            knowledge_base_id,
        };
        inner.tags.insert(id, tag.clone());
        Ok(tag)
    }

    async fn tag_article(&self, article_id: i64, tag_id: i64) -> KbResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.articles.contains_key(&article_id) {
            return Err(KnowledgeBaseError::ArticleNotFound(article_id));
        }
        if !inner.tags.contains_key(&tag_id) {
            return Err(KnowledgeBaseError::Invalid(format!("tag {} not found", tag_id)));
        }
        inner.article_tags.insert((article_id, tag_id));
        Ok(())
    }
}
