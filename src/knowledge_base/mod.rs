//! 知识库数据模型与存储

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeBaseError;

mod memory;
mod postgres;

pub use memory::MemoryKnowledgeBase;
pub use postgres::PgKnowledgeBase;

/// 默认作者（系统用户）
pub const DEFAULT_AUTHOR_ID: i64 = 1;

pub type KbResult<T> = Result<T, KnowledgeBaseError>;

/// 知识库
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct KnowledgeBase {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub author_id: i64,
    pub is_active: bool,
    pub gitlab_project_id: Option<i64>,
}

/// 新建知识库
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewKnowledgeBase {
    /// Name of the knowledge base
    pub name: String,
    /// Short description of the knowledge base
    pub description: String,
    /// Author (user) id, 1 is the system user
    #[serde(default = "default_author")]
    pub author_id: i64,
    /// GitLab project id used for issue tracking
    #[serde(default)]
    pub gitlab_project_id: Option<i64>,
}

/// 知识库更新，None字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeBaseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub gitlab_project_id: Option<i64>,
}

/// 文章
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub knowledge_base_id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub parent_id: Option<i64>,
}

/// 新建文章
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewArticle {
    /// Title of the article
    pub title: String,
    /// Full article body (markdown)
    pub content: String,
    /// Author (user) id, 1 is the system user
    #[serde(default = "default_author")]
    pub author_id: i64,
    /// Parent article id for nested articles, omit for a top-level category
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// 文章更新，None字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub parent_id: Option<i64>,
}

/// 文章层级树中的节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ArticleNode {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub parent_id: Option<i64>,
    pub knowledge_base_id: i64,
    /// 根节点为0
    pub depth: i32,
}

/// 标签，名称统一为去空白的小写形式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub knowledge_base_id: i64,
}

/// 带使用次数的标签
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagWithUsage {
    pub tag: Tag,
    pub usage_count: i64,
}

fn default_author() -> i64 {
    DEFAULT_AUTHOR_ID
}

impl NewArticle {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author_id: DEFAULT_AUTHOR_ID,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    fn validate(&self) -> KbResult<()> {
        if self.title.trim().is_empty() {
            return Err(KnowledgeBaseError::Invalid(
                "article title cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 规范化标签名
pub fn normalize_tag_name(name: &str) -> KbResult<String> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(KnowledgeBaseError::Invalid(
            "tag name cannot be empty".to_string(),
        ));
    }
    Ok(normalized)
}

/// 知识库存储接口
#[async_trait]
pub trait KnowledgeBaseRepository: Send + Sync {
    /// 建表（幂等）
    async fn ensure_schema(&self) -> KbResult<()>;

    /// 所有启用中的知识库
    async fn get_knowledge_bases(&self) -> KbResult<Vec<KnowledgeBase>>;

    async fn get_knowledge_base_by_id(&self, id: i64) -> KbResult<Option<KnowledgeBase>>;

    async fn insert_knowledge_base(&self, kb: NewKnowledgeBase) -> KbResult<KnowledgeBase>;

    async fn update_knowledge_base(
        &self,
        id: i64,
        update: KnowledgeBaseUpdate,
    ) -> KbResult<KnowledgeBase>;

    /// 以深度优先顺序返回知识库的文章树
    async fn get_article_hierarchy(&self, knowledge_base_id: i64) -> KbResult<Vec<ArticleNode>>;

    async fn get_root_level_articles(&self, knowledge_base_id: i64) -> KbResult<Vec<Article>>;

    async fn get_articles_by_parent_ids(
        &self,
        knowledge_base_id: i64,
        parent_ids: &[i64],
    ) -> KbResult<Vec<Article>>;

    async fn get_article_by_id(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
    ) -> KbResult<Option<Article>>;

    async fn insert_article(&self, knowledge_base_id: i64, article: NewArticle)
    -> KbResult<Article>;

    async fn update_article(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
        update: ArticleUpdate,
    ) -> KbResult<Article>;

    /// 标题或正文不区分大小写匹配
    async fn search_articles(&self, knowledge_base_id: i64, query: &str) -> KbResult<Vec<Article>>;

    async fn get_tags(&self, knowledge_base_id: i64) -> KbResult<Vec<TagWithUsage>>;

    async fn insert_tag(&self, knowledge_base_id: i64, name: &str) -> KbResult<Tag>;

    async fn tag_article(&self, article_id: i64, tag_id: i64) -> KbResult<()>;
}

/// 将层级节点渲染为缩进的文本树
pub fn render_hierarchy(nodes: &[ArticleNode]) -> String {
    if nodes.is_empty() {
        return "(no articles yet)".to_string();
    }

    nodes
        .iter()
        .map(|node| {
            let indent = "  ".repeat(node.depth.max(0) as usize);
            format!("{}- [{}] {}", indent, node.id, node.title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 按parent关系对文章排序并计算深度，供内存实现与测试使用
pub(crate) fn build_hierarchy(articles: &[Article], author: &str) -> Vec<ArticleNode> {
    fn visit(
        parent: Option<i64>,
        depth: i32,
        articles: &[Article],
        author: &str,
        out: &mut Vec<ArticleNode>,
    ) {
        let mut children: Vec<&Article> =
            articles.iter().filter(|a| a.parent_id == parent).collect();
        children.sort_by_key(|a| a.id);
        for article in children {
            out.push(ArticleNode {
                id: article.id,
                title: article.title.clone(),
                author: author.to_string(),
                parent_id: article.parent_id,
                knowledge_base_id: article.knowledge_base_id,
                depth,
            });
            // 防止数据中的环导致无限递归
            if depth < 32 {
                visit(Some(article.id), depth + 1, articles, author, out);
            }
        }
    }

    let mut out = Vec::with_capacity(articles.len());
    visit(None, 0, articles, author, &mut out);
    out
}

// Include tests
#[cfg(test)]
mod tests;
