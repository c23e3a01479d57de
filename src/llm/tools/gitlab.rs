//! GitLab工具，未配置GitLab时调用会返回错误

use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AgentToolbox, ToolError, join, parameters_for};
use crate::gitlab::Issue;

#[derive(Clone)]
pub struct AgentToolListProjects {
    toolbox: AgentToolbox,
}

#[derive(Clone)]
pub struct AgentToolListIssues {
    toolbox: AgentToolbox,
}

#[derive(Clone)]
pub struct AgentToolCreateIssue {
    toolbox: AgentToolbox,
}

#[derive(Clone)]
pub struct AgentToolCommentIssue {
    toolbox: AgentToolbox,
}

#[derive(Clone)]
pub struct AgentToolCreateKbIssues {
    toolbox: AgentToolbox,
}

#[derive(Clone)]
pub struct AgentToolRepositoryTree {
    toolbox: AgentToolbox,
}

impl AgentToolListProjects {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

impl AgentToolListIssues {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

impl AgentToolCreateIssue {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

impl AgentToolCommentIssue {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

impl AgentToolCreateKbIssues {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

impl AgentToolRepositoryTree {
    pub fn new(toolbox: AgentToolbox) -> Self {
        Self { toolbox }
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListProjectsArgs {}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListIssuesArgs {
    /// Project id or path, defaults to the configured project
    #[serde(default)]
    pub project_id: Option<String>,
    /// Only issues carrying all of these labels
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CreateIssueArgs {
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CommentIssueArgs {
    #[serde(default)]
    pub project_id: Option<String>,
    /// Project-scoped issue number (iid)
    pub issue_iid: i64,
    pub body: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CreateKbIssuesArgs {
    #[serde(default)]
    pub project_id: Option<String>,
    /// Knowledge base name the issues are created for
    pub kb_name: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RepositoryTreeArgs {
    #[serde(default)]
    pub project_id: Option<String>,
    /// Directory inside the repository, empty for the root
    #[serde(default)]
    pub path: String,
    /// Branch, tag or commit
    #[serde(default = "default_ref")]
    pub git_ref: String,
}

fn default_ref() -> String {
    "main".to_string()
}

fn issue_line(issue: &Issue) -> String {
    format!("#{} {} [{}]", issue.iid, issue.title, issue.labels.join(", "))
}

impl Tool for AgentToolListProjects {
    const NAME: &'static str = "list_gitlab_projects";

    type Error = ToolError;
    type Args = ListProjectsArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "List GitLab projects the agent is a member of.".to_string(),
            parameters: parameters_for::<ListProjectsArgs>(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...list_gitlab_projects");
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let projects = client.list_projects().await.map_err(ToolError::new)?;
            toolbox.record(Self::NAME, format!("{} projects", projects.len()), None);
            Ok(projects
                .iter()
                .map(|p| format!("[{}] {}", p.id, p.path_with_namespace))
                .collect::<Vec<_>>()
                .join("\n"))
        });
        join(handle).await
    }
}

impl Tool for AgentToolListIssues {
    const NAME: &'static str = "list_issues";

    type Error = ToolError;
    type Args = ListIssuesArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "List open issues of a GitLab project, optionally filtered by labels."
                .to_string(),
            parameters: parameters_for::<ListIssuesArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...list_issues@{:?}", args);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let project_id = toolbox.project_id(args.project_id)?;
            let issues = client
                .list_issues(&project_id, "opened", &args.labels)
                .await
                .map_err(ToolError::new)?;
            toolbox.record(Self::NAME, format!("{} open issues", issues.len()), None);
            if issues.is_empty() {
                return Ok("No open issues.".to_string());
            }
            Ok(issues.iter().map(issue_line).collect::<Vec<_>>().join("\n"))
        });
        join(handle).await
    }
}

impl Tool for AgentToolCreateIssue {
    const NAME: &'static str = "create_issue";

    type Error = ToolError;
    type Args = CreateIssueArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Create a GitLab issue to track work.".to_string(),
            parameters: parameters_for::<CreateIssueArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...create_issue@{}", args.title);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let project_id = toolbox.project_id(args.project_id)?;
            let issue = client
                .create_issue(&project_id, &args.title, &args.description, &args.labels)
                .await
                .map_err(ToolError::new)?;
            let summary = format!("Created issue {}", issue_line(&issue));
            toolbox.record(Self::NAME, summary.clone(), None);
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolCommentIssue {
    const NAME: &'static str = "comment_on_issue";

    type Error = ToolError;
    type Args = CommentIssueArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Add a comment to a GitLab issue on behalf of the current agent."
                .to_string(),
            parameters: parameters_for::<CommentIssueArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...comment_on_issue@{}", args.issue_iid);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let project_id = toolbox.project_id(args.project_id)?;
            let note = client
                .add_issue_comment(&project_id, args.issue_iid, toolbox.agent, &args.body)
                .await
                .map_err(ToolError::new)?;
            let summary = format!("Commented on issue #{} (note {})", args.issue_iid, note.id);
            toolbox.record(Self::NAME, summary.clone(), None);
            Ok(summary)
        });
        join(handle).await
    }
}

impl Tool for AgentToolCreateKbIssues {
    const NAME: &'static str = "create_kb_management_issues";

    type Error = ToolError;
    type Args = CreateKbIssuesArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Create the planning, content generation, quality review and maintenance issues for a knowledge base."
                .to_string(),
            parameters: parameters_for::<CreateKbIssuesArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...create_kb_management_issues@{}", args.kb_name);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let project_id = toolbox.project_id(args.project_id)?;
            let issues = client
                .create_kb_management_issues(&project_id, &args.kb_name)
                .await
                .map_err(ToolError::new)?;
            toolbox.record(
                Self::NAME,
                format!("{} issues for {}", issues.len(), args.kb_name),
                None,
            );
            Ok(issues.iter().map(issue_line).collect::<Vec<_>>().join("\n"))
        });
        join(handle).await
    }
}

impl Tool for AgentToolRepositoryTree {
    const NAME: &'static str = "list_repository_tree";

    type Error = ToolError;
    type Args = RepositoryTreeArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "List files and directories of a GitLab repository path.".to_string(),
            parameters: parameters_for::<RepositoryTreeArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        println!("   🔧 tool called...list_repository_tree@{}", args.path);
        let toolbox = self.toolbox.clone();
        let handle = tokio::spawn(async move {
            let client = toolbox.gitlab_client()?;
            let project_id = toolbox.project_id(args.project_id)?;
            let entries = client
                .list_repository_tree(&project_id, &args.path, &args.git_ref)
                .await
                .map_err(ToolError::new)?;
            toolbox.record(Self::NAME, format!("{} entries", entries.len()), None);
            if entries.is_empty() {
                return Ok("Empty directory.".to_string());
            }
            Ok(entries
                .iter()
                .map(|e| {
                    let marker = if e.kind == "tree" { "📁" } else { "📄" };
                    format!("{} {}", marker, e.path)
                })
                .collect::<Vec<_>>()
                .join("\n"))
        });
        join(handle).await
    }
}
