//! 知识库工具

use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AgentToolbox, ContextChange, ToolError, join, parameters_for};
use crate::knowledge_base::{ArticleUpdate, NewArticle, render_hierarchy};

macro_rules! toolbox_tool {
    ($name:ident) => {
        #[derive(Clone)]
        pub struct $name {
            toolbox: AgentToolbox,
        }

        impl $name {
            pub fn new(toolbox: AgentToolbox) -> Self {
                Self { toolbox }
            }
        }
    };
}

toolbox_tool!(AgentToolListKnowledgeBases);
toolbox_tool!(AgentToolSetContext);
toolbox_tool!(AgentToolSetArticleContext);
toolbox_tool!(AgentToolHierarchy);
toolbox_tool!(AgentToolGetArticle);
toolbox_tool!(AgentToolInsertArticle);
toolbox_tool!(AgentToolUpdateArticle);
toolbox_tool!(AgentToolSearchArticles);

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct KnowledgeBaseArgs {
    /// Id of the knowledge base
    pub knowledge_base_id: i64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ArticleArgs {
    /// Id of the knowledge base that owns the article
    pub knowledge_base_id: i64,
    /// Id of the article
    pub article_id: i64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct InsertArticleArgs {
    /// Id of the knowledge base to write into
    pub knowledge_base_id: i64,
    #[serde(flatten)]
    pub article: NewArticle,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateArticleArgs {
    pub knowledge_base_id: i64,
    pub article_id: i64,
    #[serde(flatten)]
    pub update: ArticleUpdate,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SearchArgs {
    pub knowledge_base_id: i64,
    /// Text matched against article titles and content (case-insensitive)
    pub query: String,
}

fn definition_of<T: JsonSchema>(name: &str, description: &str) -> rig::completion::ToolDefinition {
    rig::completion::ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: parameters_for::<T>(),
    }
}

impl Tool for AgentToolListKnowledgeBases {
    const NAME: &'static str = "list_knowledge_bases";

    type Error = ToolError;
    type Args = NoArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<NoArgs>(Self::NAME, "List all active knowledge bases with their ids.")
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...list_knowledge_bases");
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let kbs = toolbox.kb.get_knowledge_bases().await.map_err(ToolError::new)?;
            let listing = if kbs.is_empty() {
                "No knowledge bases found.".to_string()
            } else {
                kbs.iter()
                    .map(|kb| format!("[{}] {} - {}", kb.id, kb.name, kb.description))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            toolbox.record(Self::NAME, format!("{} knowledge bases", kbs.len()), None);
            Ok(listing)
        });
        join(handle).await
    }
}

impl Tool for AgentToolSetContext {
    const NAME: &'static str = "set_knowledge_base_context";

    type Error = ToolError;
    type Args = KnowledgeBaseArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<KnowledgeBaseArgs>(
            Self::NAME,
            "Select the knowledge base that later operations in this conversation work on.",
        )
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...set_knowledge_base_context@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let kb = toolbox
                .kb
                .get_knowledge_base_by_id(args.knowledge_base_id)
                .await
                .map_err(ToolError::new)?
                .ok_or_else(|| {
                    ToolError::new(format!("Knowledge base {} not found", args.knowledge_base_id))
                })?;
            let summary = format!("Knowledge base context set to [{}] {}", kb.id, kb.name);
            toolbox.record(
                Self::NAME,
                summary.clone(),
                Some(ContextChange::KnowledgeBase {
                    id: kb.id,
                    name: kb.name,
                }),
            );
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolSetArticleContext {
    const NAME: &'static str = "set_article_context";

    type Error = ToolError;
    type Args = ArticleArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<ArticleArgs>(Self::NAME, "Select the article to focus on.")
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...set_article_context@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let article = toolbox
                .kb
                .get_article_by_id(args.knowledge_base_id, args.article_id)
                .await
                .map_err(ToolError::new)?
                .ok_or_else(|| ToolError::new(format!("Article {} not found", args.article_id)))?;
            let summary = format!("Article context set to [{}] {}", article.id, article.title);
            toolbox.record(
                Self::NAME,
                summary.clone(),
                Some(ContextChange::Article {
                    knowledge_base_id: article.knowledge_base_id,
                    article_id: article.id,
                }),
            );
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolHierarchy {
    const NAME: &'static str = "get_article_hierarchy";

    type Error = ToolError;
    type Args = KnowledgeBaseArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<KnowledgeBaseArgs>(
            Self::NAME,
            "Show the article tree of a knowledge base as an indented list of [id] title.",
        )
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...get_article_hierarchy@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let nodes = toolbox
                .kb
                .get_article_hierarchy(args.knowledge_base_id)
                .await
                .map_err(ToolError::new)?;
            toolbox.record(Self::NAME, format!("{} articles", nodes.len()), None);
            Ok(render_hierarchy(&nodes))
        });
        join(handle).await
    }
}

impl Tool for AgentToolGetArticle {
    const NAME: &'static str = "get_article";

    type Error = ToolError;
    type Args = ArticleArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<ArticleArgs>(Self::NAME, "Read the full content of an article.")
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...get_article@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let article = toolbox
                .kb
                .get_article_by_id(args.knowledge_base_id, args.article_id)
                .await
                .map_err(ToolError::new)?
                .ok_or_else(|| ToolError::new(format!("Article {} not found", args.article_id)))?;
            toolbox.record(Self::NAME, format!("read article {}", article.id), None);
            Ok(format!("# {}\n\n{}", article.title, article.content))
        });
        join(handle).await
    }
}

impl Tool for AgentToolInsertArticle {
    const NAME: &'static str = "insert_article";

    type Error = ToolError;
    type Args = InsertArticleArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<InsertArticleArgs>(
            Self::NAME,
            "Create a new article. Omit parent_id for a top-level category.",
        )
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...insert_article@{}", args.article.title);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let article = toolbox
                .kb
                .insert_article(args.knowledge_base_id, args.article)
                .await
                .map_err(ToolError::new)?;
            let summary = format!("Created article [{}] {}", article.id, article.title);
            toolbox.record(Self::NAME, summary.clone(), None);
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolUpdateArticle {
    const NAME: &'static str = "update_article";

    type Error = ToolError;
    type Args = UpdateArticleArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<UpdateArticleArgs>(
            Self::NAME,
            "Update the title, content or parent of an existing article.",
        )
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...update_article@{}", args.article_id);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let article = toolbox
                .kb
                .update_article(args.knowledge_base_id, args.article_id, args.update)
                .await
                .map_err(ToolError::new)?;
            let summary = format!("Updated article [{}] {}", article.id, article.title);
            toolbox.record(Self::NAME, summary.clone(), None);
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolSearchArticles {
    const NAME: &'static str = "search_articles";

    type Error = ToolError;
    type Args = SearchArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        definition_of::<SearchArgs>(Self::NAME, "Search articles of a knowledge base by text.")
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...search_articles@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let articles = toolbox
                .kb
                .search_articles(args.knowledge_base_id, &args.query)
                .await
                .map_err(ToolError::new)?;
            toolbox.record(
                Self::NAME,
                format!("{} matches for '{}'", articles.len(), args.query),
                None,
            );
            if articles.is_empty() {
                return Ok(format!("No articles match '{}'.", args.query));
            }
            Ok(articles
                .iter()
                .map(|a| format!("[{}] {}", a.id, a.title))
                .collect::<Vec<_>>()
                .join("\n"))
        });
        join(handle).await
    }
}
