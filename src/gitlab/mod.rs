//! GitLab REST客户端
//!
//! Issue充当agent之间共享的工作队列；agent写入的评论统一带上agent标识。

use rand::Rng;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::agents::AgentName;
use crate::config::GitLabConfig;
use crate::error::GitLabError;
use crate::knowledge_base::{KnowledgeBaseRepository, KnowledgeBaseUpdate};

pub mod work_items;

pub use work_items::{IN_PROGRESS_LABEL, WORK_ITEM_LABEL, label_slug};

pub type GitLabResult<T> = Result<T, GitLabError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitLabUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub path_with_namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: i64,
    pub iid: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: i64,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

/// 新建项目参数
#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub visibility: String,
    pub initialize_with_readme: bool,
}

impl NewProject {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            visibility: "public".to_string(),
            initialize_with_readme: false,
        }
    }
}

/// 项目更新，None字段不修改
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

/// Issue更新，None字段不修改
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_labels: Option<String>,
    /// "close" 或 "reopen"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<String>,
}

impl IssueUpdate {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("- title → {}", title));
        }
        if self.description.is_some() {
            parts.push("- description updated".to_string());
        }
        if let Some(labels) = &self.add_labels {
            parts.push(format!("- labels added: {}", labels));
        }
        if let Some(labels) = &self.remove_labels {
            parts.push(format!("- labels removed: {}", labels));
        }
        if let Some(event) = &self.state_event {
            parts.push(format!("- state: {}", event));
        }
        if parts.is_empty() {
            "Issue updated.".to_string()
        } else {
            format!("Issue updated:\n{}", parts.join("\n"))
        }
    }
}

/// 带agent标识的评论正文
pub fn agent_note(agent: AgentName, body: &str) -> String {
    format!("**🤖 {}**\n\n{}", agent, body)
}

/// `group/project` 路径需要转义后才能放进URL
pub fn encode_project_id(project_id: &str) -> String {
    project_id.trim().replace('/', "%2F")
}

/// GitLab客户端
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitLabClient {
    /// 创建客户端，不做连通性检查
    pub fn new(url: &str, token: &str) -> GitLabResult<Self> {
        if token.trim().is_empty() {
            return Err(GitLabError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("kb-agents/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: format!("{}/api/v4", url.trim_end_matches('/')),
            token: token.trim().to_string(),
        })
    }

    /// 创建客户端并确认凭据可用
    ///
    /// 每次尝试都有超时；失败后按指数退避（附带少量抖动）重试。
    pub async fn connect(config: &GitLabConfig) -> GitLabResult<Self> {
        let token = config.token.as_deref().ok_or(GitLabError::NotConfigured)?;
        let client = Self::new(&config.url, token)?;

        let attempts = config.connect_retries.max(1);
        let timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
        let mut backoff_ms = config.connect_backoff_ms;

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, client.current_user()).await {
                Ok(Ok(user)) => {
                    println!("✅ GitLab连接成功: {} ({})", user.username, config.url);
                    return Ok(client);
                }
                Ok(Err(e @ GitLabError::Status { status: 401, .. })) => {
                    eprintln!("❌ GitLab认证失败，请检查GITLAB_PAT");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    eprintln!(
                        "⚠️ GitLab连接失败 (第 {} / {} 次尝试): {}",
                        attempt, attempts, e
                    );
                }
                Err(_) => {
                    eprintln!(
                        "⚠️ GitLab连接超时 (第 {} / {} 次尝试, {}s)",
                        attempt,
                        attempts,
                        timeout.as_secs()
                    );
                }
            }

            if attempt < attempts {
                let jitter = rand::rng().random_range(0..=backoff_ms / 4);
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
        }

        Err(GitLabError::Timeout(attempts))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> GitLabResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GitLabError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| GitLabError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> GitLabResult<T> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        Self::decode(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> GitLabResult<T> {
        let response = self.request(method, path).json(body).send().await?;
        Self::decode(response).await
    }

    pub async fn current_user(&self) -> GitLabResult<GitLabUser> {
        self.get("/user", &[]).await
    }

    // ---------- 项目 ----------

    pub async fn list_projects(&self) -> GitLabResult<Vec<Project>> {
        self.get(
            "/projects",
            &[
                ("membership", "true".to_string()),
                ("per_page", "100".to_string()),
                ("order_by", "last_activity_at".to_string()),
            ],
        )
        .await
    }

    pub async fn get_project(&self, project_id: &str) -> GitLabResult<Project> {
        self.get(&format!("/projects/{}", encode_project_id(project_id)), &[])
            .await
    }

    pub async fn list_repository_tree(
        &self,
        project_id: &str,
        path: &str,
        git_ref: &str,
    ) -> GitLabResult<Vec<TreeEntry>> {
        let mut query = vec![("ref", git_ref.to_string()), ("per_page", "100".to_string())];
        if !path.is_empty() {
            query.push(("path", path.to_string()));
        }
        self.get(
            &format!("/projects/{}/repository/tree", encode_project_id(project_id)),
            &query,
        )
        .await
    }

    /// 读取仓库文件并做base64解码
    pub async fn get_file_content(
        &self,
        project_id: &str,
        file_path: &str,
        git_ref: &str,
    ) -> GitLabResult<String> {
        use base64::Engine;

        #[derive(Deserialize)]
        struct FileResponse {
            content: String,
        }

        let encoded_path = file_path.trim_start_matches('/').replace('/', "%2F");
        let file: FileResponse = self
            .get(
                &format!(
                    "/projects/{}/repository/files/{}",
                    encode_project_id(project_id),
                    encoded_path
                ),
                &[("ref", git_ref.to_string())],
            )
            .await?;

        let compact: String = file.content.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| GitLabError::Decode(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| GitLabError::Decode(e.to_string()))
    }

    pub async fn create_project(&self, project: &NewProject) -> GitLabResult<Project> {
        let body = serde_json::to_value(project).map_err(|e| GitLabError::Decode(e.to_string()))?;
        self.send_json(Method::POST, "/projects", &body).await
    }

    /// 创建项目并将项目id写回知识库
    pub async fn create_project_for_knowledge_base(
        &self,
        knowledge_base: &dyn KnowledgeBaseRepository,
        knowledge_base_id: i64,
        project: &NewProject,
    ) -> GitLabResult<Project> {
        let created = self.create_project(project).await?;
        match knowledge_base
            .update_knowledge_base(
                knowledge_base_id,
                KnowledgeBaseUpdate {
                    gitlab_project_id: Some(created.id),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) => println!(
                "✅ 知识库 {} 已关联GitLab项目 {}",
                knowledge_base_id, created.id
            ),
            Err(e) => eprintln!(
                "⚠️ 已创建GitLab项目 {}，但关联知识库 {} 失败: {}",
                created.id, knowledge_base_id, e
            ),
        }
        Ok(created)
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> GitLabResult<Project> {
        let body = serde_json::to_value(update).map_err(|e| GitLabError::Decode(e.to_string()))?;
        self.send_json(
            Method::PUT,
            &format!("/projects/{}", encode_project_id(project_id)),
            &body,
        )
        .await
    }

    /// 同时修改名称与路径
    pub async fn rename_project(&self, project_id: &str, new_name: &str) -> GitLabResult<Project> {
        self.update_project(
            project_id,
            &ProjectUpdate {
                name: Some(new_name.to_string()),
                path: Some(label_slug(new_name)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn archive_project(&self, project_id: &str) -> GitLabResult<Project> {
        self.send_json(
            Method::POST,
            &format!("/projects/{}/archive", encode_project_id(project_id)),
            &json!({}),
        )
        .await
    }

    pub async fn delete_project(&self, project_id: &str) -> GitLabResult<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/projects/{}", encode_project_id(project_id)),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitLabError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    // ---------- Issue ----------

    pub async fn create_issue(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> GitLabResult<Issue> {
        let mut body = json!({ "title": title, "description": description });
        if !labels.is_empty() {
            body["labels"] = Value::String(labels.join(","));
        }
        self.send_json(
            Method::POST,
            &format!("/projects/{}/issues", encode_project_id(project_id)),
            &body,
        )
        .await
    }

    pub async fn list_issues(
        &self,
        project_id: &str,
        state: &str,
        labels: &[String],
    ) -> GitLabResult<Vec<Issue>> {
        let mut query = vec![("state", state.to_string()), ("per_page", "100".to_string())];
        if !labels.is_empty() {
            query.push(("labels", labels.join(",")));
        }
        self.get(
            &format!("/projects/{}/issues", encode_project_id(project_id)),
            &query,
        )
        .await
    }

    pub async fn get_issue(&self, project_id: &str, issue_iid: i64) -> GitLabResult<Issue> {
        self.get(
            &format!(
                "/projects/{}/issues/{}",
                encode_project_id(project_id),
                issue_iid
            ),
            &[],
        )
        .await
    }

    /// 更新issue，并以agent身份记录一条说明
    pub async fn update_issue(
        &self,
        project_id: &str,
        issue_iid: i64,
        agent: AgentName,
        update: &IssueUpdate,
    ) -> GitLabResult<Issue> {
        let body = serde_json::to_value(update).map_err(|e| GitLabError::Decode(e.to_string()))?;
        let issue: Issue = self
            .send_json(
                Method::PUT,
                &format!(
                    "/projects/{}/issues/{}",
                    encode_project_id(project_id),
                    issue_iid
                ),
                &body,
            )
            .await?;
        self.add_issue_comment(project_id, issue_iid, agent, &update.describe())
            .await?;
        Ok(issue)
    }

    /// 以agent身份留下结束说明后关闭issue
    pub async fn close_issue(
        &self,
        project_id: &str,
        issue_iid: i64,
        agent: AgentName,
        note: &str,
    ) -> GitLabResult<Issue> {
        let body = if note.trim().is_empty() {
            "Closing this issue.".to_string()
        } else {
            note.to_string()
        };
        self.add_issue_comment(project_id, issue_iid, agent, &body)
            .await?;
        self.send_json(
            Method::PUT,
            &format!(
                "/projects/{}/issues/{}",
                encode_project_id(project_id),
                issue_iid
            ),
            &json!({ "state_event": "close" }),
        )
        .await
    }

    pub async fn add_issue_comment(
        &self,
        project_id: &str,
        issue_iid: i64,
        agent: AgentName,
        body: &str,
    ) -> GitLabResult<Note> {
        self.send_json(
            Method::POST,
            &format!(
                "/projects/{}/issues/{}/notes",
                encode_project_id(project_id),
                issue_iid
            ),
            &json!({ "body": agent_note(agent, body) }),
        )
        .await
    }

    pub async fn add_labels(
        &self,
        project_id: &str,
        issue_iid: i64,
        labels: &[String],
    ) -> GitLabResult<Issue> {
        self.send_json(
            Method::PUT,
            &format!(
                "/projects/{}/issues/{}",
                encode_project_id(project_id),
                issue_iid
            ),
            &json!({ "add_labels": labels.join(",") }),
        )
        .await
    }
}
