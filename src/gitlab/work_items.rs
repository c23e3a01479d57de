//! 以issue表示的工作项

use super::{GitLabClient, GitLabResult, Issue};
use crate::agents::AgentName;

/// 标记为工作项的标签
pub const WORK_ITEM_LABEL: &str = "work-item";
/// agent认领后追加的标签
pub const IN_PROGRESS_LABEL: &str = "in-progress";

/// 标签友好的名称：小写，空白替换为连字符
pub fn label_slug(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// 知识库管理issue模板
#[derive(Debug, Clone, PartialEq)]
pub struct IssueTemplate {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
}

fn checklist(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- [ ] {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 新知识库的四个阶段：规划、内容生成、质量评审、部署与维护
pub fn kb_management_templates(kb_name: &str) -> Vec<IssueTemplate> {
    let slug = label_slug(kb_name);
    let labels = |phase: &[&str]| -> Vec<String> {
        phase
            .iter()
            .map(|l| l.to_string())
            .chain(["knowledge-base".to_string(), WORK_ITEM_LABEL.to_string(), slug.clone()])
            .collect()
    };

    vec![
        IssueTemplate {
            title: format!("📋 Knowledge Base Planning - {}", kb_name),
            description: format!(
                "# Knowledge Base Planning\n\nThis issue tracks the overall planning and structure for the **{}** knowledge base.\n\n## Planning Tasks:\n{}\n\n## Status:\n- **Phase**: Planning\n- **KB Name**: {}",
                kb_name,
                checklist(&[
                    "Define knowledge base scope and objectives",
                    "Identify content sources and references",
                    "Plan article structure and organization",
                    "Set up content review process",
                    "Define success criteria and metrics",
                ]),
                kb_name
            ),
            labels: labels(&["planning"]),
        },
        IssueTemplate {
            title: format!("✍️ Content Generation - {}", kb_name),
            description: format!(
                "# Content Generation\n\nThis issue tracks content creation for the **{}** knowledge base.\n\n## Content Tasks:\n{}\n\n## Status:\n- **Phase**: Content Generation\n- **KB Name**: {}\n- **Dependencies**: Planning phase completion",
                kb_name,
                checklist(&[
                    "Generate initial articles and documentation",
                    "Create structured content outline",
                    "Develop comprehensive article content",
                    "Ensure content quality and accuracy",
                    "Add relevant tags and metadata",
                ]),
                kb_name
            ),
            labels: labels(&["content-generation"]),
        },
        IssueTemplate {
            title: format!("🔍 Quality Review - {}", kb_name),
            description: format!(
                "# Quality Review and Validation\n\nThis issue tracks quality assurance for the **{}** knowledge base.\n\n## Review Tasks:\n{}\n\n## Status:\n- **Phase**: Quality Review\n- **KB Name**: {}\n- **Dependencies**: Content generation completion",
                kb_name,
                checklist(&[
                    "Content accuracy verification",
                    "Technical review of articles",
                    "Format and style consistency check",
                    "Cross-reference validation",
                ]),
                kb_name
            ),
            labels: labels(&["quality-review"]),
        },
        IssueTemplate {
            title: format!("🚀 Deployment & Maintenance - {}", kb_name),
            description: format!(
                "# Deployment and Ongoing Maintenance\n\nThis issue tracks deployment and maintenance for the **{}** knowledge base.\n\n## Tasks:\n{}\n\n## Status:\n- **Phase**: Deployment & Maintenance\n- **KB Name**: {}\n- **Dependencies**: Quality review completion",
                kb_name,
                checklist(&[
                    "Prepare knowledge base for production",
                    "Regular content updates",
                    "User feedback integration",
                    "Backup and recovery procedures",
                ]),
                kb_name
            ),
            labels: labels(&["deployment", "maintenance"]),
        },
    ]
}

/// 工作项：带work-item标签，或GitLab类型为task
pub fn is_work_item(issue: &Issue) -> bool {
    issue.labels.iter().any(|l| l == WORK_ITEM_LABEL)
        || issue
            .issue_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("task"))
}

impl GitLabClient {
    /// 为新知识库创建管理issue，单个失败不影响其余
    pub async fn create_kb_management_issues(
        &self,
        project_id: &str,
        kb_name: &str,
    ) -> GitLabResult<Vec<Issue>> {
        let mut created = Vec::new();
        let mut last_error = None;
        for template in kb_management_templates(kb_name) {
            match self
                .create_issue(
                    project_id,
                    &template.title,
                    &template.description,
                    &template.labels,
                )
                .await
            {
                Ok(issue) => created.push(issue),
                Err(e) => {
                    eprintln!("⚠️ 创建issue失败 '{}': {}", template.title, e);
                    last_error = Some(e);
                }
            }
        }
        match (created.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(created),
        }
    }

    /// 打开状态的工作项
    pub async fn list_work_items(&self, project_id: &str) -> GitLabResult<Vec<Issue>> {
        let issues = self.list_issues(project_id, "opened", &[]).await?;
        Ok(issues.into_iter().filter(is_work_item).collect())
    }

    pub async fn get_work_item(&self, project_id: &str, iid: i64) -> GitLabResult<Issue> {
        self.get_issue(project_id, iid).await
    }

    /// 找到第一个带有任一标签且尚未被认领的issue
    pub async fn find_open_issue_with_labels(
        &self,
        project_id: &str,
        labels: &[String],
    ) -> GitLabResult<Option<Issue>> {
        let issues = self.list_issues(project_id, "opened", &[]).await?;
        Ok(issues.into_iter().find(|issue| {
            !issue.labels.iter().any(|l| l == IN_PROGRESS_LABEL)
                && issue.labels.iter().any(|l| labels.contains(l))
        }))
    }

    /// 认领：追加in-progress标签并留下agent评论
    pub async fn claim_issue(
        &self,
        project_id: &str,
        issue: &Issue,
        agent: AgentName,
    ) -> GitLabResult<Issue> {
        let claimed = self
            .add_labels(project_id, issue.iid, &[IN_PROGRESS_LABEL.to_string()])
            .await?;
        self.add_issue_comment(
            project_id,
            issue.iid,
            agent,
            &format!("Working on this issue: {}", issue.title),
        )
        .await?;
        Ok(claimed)
    }
}
