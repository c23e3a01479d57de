//! 各模块边界上的错误类型

use thiserror::Error;

/// 会话状态存储错误
#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize session state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session context: {0}")]
    Validation(String),
}

/// 知识库操作错误
#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("knowledge base {0} not found")]
    KnowledgeBaseNotFound(i64),

    #[error("article {0} not found")]
    ArticleNotFound(i64),

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// GitLab REST 调用错误
#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("GitLab is not configured (set GITLAB_PAT)")]
    NotConfigured,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitLab returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode GitLab response: {0}")]
    Decode(String),

    #[error("could not reach GitLab after {0} attempts")]
    Timeout(u32),
}

/// 意图分类时LLM输出无法解析
#[derive(Debug, Error, PartialEq)]
pub enum ClassifierError {
    #[error("empty classifier response")]
    EmptyResponse,

    #[error("no JSON object with an intent field found")]
    NoJson,

    #[error("classifier JSON has no usable intent")]
    MissingIntent,
}
