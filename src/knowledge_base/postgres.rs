//! 基于PostgreSQL的知识库存储

use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    Article, ArticleNode, ArticleUpdate, KbResult, KnowledgeBase, KnowledgeBaseRepository,
    KnowledgeBaseUpdate, NewArticle, NewKnowledgeBase, Tag, TagWithUsage, normalize_tag_name,
};
use crate::error::KnowledgeBaseError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
INSERT INTO users (id, name) VALUES (1, 'system') ON CONFLICT (id) DO NOTHING;

CREATE TABLE IF NOT EXISTS knowledge_base (
    id                  BIGSERIAL PRIMARY KEY,
    name                TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    author_id           BIGINT NOT NULL REFERENCES users(id),
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    gitlab_project_id   BIGINT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS articles (
    id                  BIGSERIAL PRIMARY KEY,
    knowledge_base_id   BIGINT NOT NULL REFERENCES knowledge_base(id),
    title               TEXT NOT NULL,
    content             TEXT NOT NULL DEFAULT '',
    author_id           BIGINT NOT NULL REFERENCES users(id),
    parent_id           BIGINT REFERENCES articles(id),
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_articles_kb_parent ON articles (knowledge_base_id, parent_id);

CREATE TABLE IF NOT EXISTS tags (
    id                  BIGSERIAL PRIMARY KEY,
    name                TEXT NOT NULL,
    knowledge_base_id   BIGINT NOT NULL REFERENCES knowledge_base(id),
    UNIQUE (knowledge_base_id, name)
);

CREATE TABLE IF NOT EXISTS article_tags (
    article_id  BIGINT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    tag_id      BIGINT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (article_id, tag_id)
);

CREATE OR REPLACE FUNCTION get_article_hierarchy(p_knowledge_base_id BIGINT)
RETURNS TABLE (
    id BIGINT,
    title TEXT,
    author TEXT,
    parent_id BIGINT,
    knowledge_base_id BIGINT,
    depth INT
) AS $$
    WITH RECURSIVE tree AS (
        SELECT a.id, a.title, a.author_id, a.parent_id, a.knowledge_base_id,
               0 AS depth, ARRAY[a.id] AS path
        FROM articles a
        WHERE a.knowledge_base_id = p_knowledge_base_id
          AND a.parent_id IS NULL
          AND a.is_active = TRUE
        UNION ALL
        SELECT c.id, c.title, c.author_id, c.parent_id, c.knowledge_base_id,
               t.depth + 1, t.path || c.id
        FROM articles c
        JOIN tree t ON c.parent_id = t.id
        WHERE c.is_active = TRUE
          AND NOT c.id = ANY(t.path)
    )
    SELECT tree.id, tree.title, u.name, tree.parent_id, tree.knowledge_base_id, tree.depth
    FROM tree
    JOIN users u ON u.id = tree.author_id
    ORDER BY tree.path;
$$ LANGUAGE sql STABLE;
"#;

const ARTICLE_COLUMNS: &str = "id, knowledge_base_id, title, content, author_id, parent_id";
const KB_COLUMNS: &str = "id, name, description, author_id, is_active, gitlab_project_id";

/// 子串匹配的LIKE模式，用户输入中的 `%` `_` `\` 按字面量匹配
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::from("%");
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// PostgreSQL知识库存储
#[derive(Clone)]
pub struct PgKnowledgeBase {
    pool: PgPool,
}

impl PgKnowledgeBase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeBaseRepository for PgKnowledgeBase {
    async fn ensure_schema(&self) -> KbResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        // 显式插入id后需要修正序列
        sqlx::query("SELECT setval('users_id_seq', GREATEST((SELECT MAX(id) FROM users), 1))")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_knowledge_bases(&self) -> KbResult<Vec<KnowledgeBase>> {
        let sql = format!(
            "SELECT {} FROM knowledge_base WHERE is_active = TRUE ORDER BY id",
            KB_COLUMNS
        );
        let rows = sqlx::query_as::<_, KnowledgeBase>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_knowledge_base_by_id(&self, id: i64) -> KbResult<Option<KnowledgeBase>> {
        let sql = format!("SELECT {} FROM knowledge_base WHERE id = $1", KB_COLUMNS);
        let row = sqlx::query_as::<_, KnowledgeBase>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_knowledge_base(&self, kb: NewKnowledgeBase) -> KbResult<KnowledgeBase> {
        if kb.name.trim().is_empty() {
            return Err(KnowledgeBaseError::Invalid(
                "knowledge base name cannot be empty".to_string(),
            ));
        }
        let sql = format!(
            "INSERT INTO knowledge_base (name, description, author_id, gitlab_project_id) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            KB_COLUMNS
        );
        let row = sqlx::query_as::<_, KnowledgeBase>(&sql)
            .bind(kb.name.trim())
            .bind(&kb.description)
            .bind(kb.author_id)
            .bind(kb.gitlab_project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_knowledge_base(
        &self,
        id: i64,
        update: KnowledgeBaseUpdate,
    ) -> KbResult<KnowledgeBase> {
        let sql = format!(
            "UPDATE knowledge_base SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                is_active = COALESCE($4, is_active), \
                gitlab_project_id = COALESCE($5, gitlab_project_id) \
             WHERE id = $1 RETURNING {}",
            KB_COLUMNS
        );
        sqlx::query_as::<_, KnowledgeBase>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.description)
            .bind(update.is_active)
            .bind(update.gitlab_project_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(KnowledgeBaseError::KnowledgeBaseNotFound(id))
    }

    async fn get_article_hierarchy(&self, knowledge_base_id: i64) -> KbResult<Vec<ArticleNode>> {
        let rows = sqlx::query_as::<_, ArticleNode>(
            "SELECT id, title, author, parent_id, knowledge_base_id, depth \
             FROM get_article_hierarchy($1)",
        )
        .bind(knowledge_base_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_root_level_articles(&self, knowledge_base_id: i64) -> KbResult<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles \
             WHERE parent_id IS NULL AND knowledge_base_id = $1 AND is_active = TRUE ORDER BY id",
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(knowledge_base_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_articles_by_parent_ids(
        &self,
        knowledge_base_id: i64,
        parent_ids: &[i64],
    ) -> KbResult<Vec<Article>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM articles \
             WHERE parent_id = ANY($1) AND knowledge_base_id = $2 AND is_active = TRUE ORDER BY id",
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(parent_ids)
            .bind(knowledge_base_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_article_by_id(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
    ) -> KbResult<Option<Article>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE id = $1 AND knowledge_base_id = $2",
            ARTICLE_COLUMNS
        );
        let row = sqlx::query_as::<_, Article>(&sql)
            .bind(article_id)
            .bind(knowledge_base_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_article(
        &self,
        knowledge_base_id: i64,
        article: NewArticle,
    ) -> KbResult<Article> {
        article.validate()?;
        let sql = format!(
            "INSERT INTO articles (knowledge_base_id, title, content, author_id, parent_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            ARTICLE_COLUMNS
        );
        let row = sqlx::query_as::<_, Article>(&sql)
            .bind(knowledge_base_id)
            .bind(article.title.trim())
            .bind(&article.content)
            .bind(article.author_id)
            .bind(article.parent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_article(
        &self,
        knowledge_base_id: i64,
        article_id: i64,
        update: ArticleUpdate,
    ) -> KbResult<Article> {
        let sql = format!(
            "UPDATE articles SET \
                title = COALESCE($3, title), \
                content = COALESCE($4, content), \
                parent_id = COALESCE($5, parent_id), \
                updated_at = now() \
             WHERE id = $1 AND knowledge_base_id = $2 RETURNING {}",
            ARTICLE_COLUMNS
        );
        sqlx::query_as::<_, Article>(&sql)
            .bind(article_id)
            .bind(knowledge_base_id)
            .bind(update.title)
            .bind(update.content)
            .bind(update.parent_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(KnowledgeBaseError::ArticleNotFound(article_id))
    }

    async fn search_articles(&self, knowledge_base_id: i64, query: &str) -> KbResult<Vec<Article>> {
        let pattern = contains_pattern(query);
        let sql = format!(
            "SELECT {} FROM articles \
             WHERE knowledge_base_id = $1 AND is_active = TRUE \
               AND (title ILIKE $2 ESCAPE '\\' OR content ILIKE $2 ESCAPE '\\') ORDER BY id",
            ARTICLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, Article>(&sql)
            .bind(knowledge_base_id)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_tags(&self, knowledge_base_id: i64) -> KbResult<Vec<TagWithUsage>> {
        let rows: Vec<(i64, String, i64, i64)> = sqlx::query_as(
            "SELECT t.id, t.name, t.knowledge_base_id, COUNT(at.article_id) AS usage_count \
             FROM tags t LEFT JOIN article_tags at ON at.tag_id = t.id \
             WHERE t.knowledge_base_id = $1 \
             GROUP BY t.id, t.name, t.knowledge_base_id \
             ORDER BY usage_count DESC, t.name",
        )
        .bind(knowledge_base_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, knowledge_base_id, usage_count)| TagWithUsage {
                tag: Tag {
                    id,
                    name,
                    knowledge_base_id,
                },
                usage_count,
            })
            .collect())
    }

    async fn insert_tag(&self, knowledge_base_id: i64, name: &str) -> KbResult<Tag> {
        let name = normalize_tag_name(name)?;
        let row = sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (name, knowledge_base_id) VALUES ($1, $2) \
             ON CONFLICT (knowledge_base_id, name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name, knowledge_base_id",
        )
        .bind(name)
        .bind(knowledge_base_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn tag_article(&self, article_id: i64, tag_id: i64) -> KbResult<()> {
        sqlx::query(
            "INSERT INTO article_tags (article_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(article_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
