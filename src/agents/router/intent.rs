//! 意图标签及其目标agent

use serde::{Deserialize, Serialize};

use crate::agents::AgentName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateContent,
    AnalyzeContentGaps,
    RetrieveContent,
    RetrieveFilteredContent,
    UpdateContent,
    SearchContent,
    SetKnowledgeBaseContext,
    SetArticleContext,
    GetConversationHistory,
    GeneralInquiry,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Intent::CreateContent,
        Intent::AnalyzeContentGaps,
        Intent::RetrieveContent,
        Intent::RetrieveFilteredContent,
        Intent::UpdateContent,
        Intent::SearchContent,
        Intent::SetKnowledgeBaseContext,
        Intent::SetArticleContext,
        Intent::GetConversationHistory,
        Intent::GeneralInquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateContent => "create_content",
            Intent::AnalyzeContentGaps => "analyze_content_gaps",
            Intent::RetrieveContent => "retrieve_content",
            Intent::RetrieveFilteredContent => "retrieve_filtered_content",
            Intent::UpdateContent => "update_content",
            Intent::SearchContent => "search_content",
            Intent::SetKnowledgeBaseContext => "set_knowledge_base_context",
            Intent::SetArticleContext => "set_article_context",
            Intent::GetConversationHistory => "get_conversation_history",
            Intent::GeneralInquiry => "general_inquiry",
        }
    }

    /// 负责处理该意图的agent
    pub fn target_agent(&self) -> AgentName {
        match self {
            Intent::CreateContent | Intent::AnalyzeContentGaps => AgentName::ContentPlanner,
            Intent::RetrieveContent
            | Intent::RetrieveFilteredContent
            | Intent::UpdateContent
            | Intent::SearchContent
            | Intent::SetKnowledgeBaseContext
            | Intent::SetArticleContext => AgentName::Supervisor,
            Intent::GetConversationHistory | Intent::GeneralInquiry => AgentName::UserProxy,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

/// 意图字符串到目标agent，未知意图交给ContentPlanner
pub fn target_for(intent: &str) -> AgentName {
    intent
        .parse::<Intent>()
        .map(|i| i.target_agent())
        .unwrap_or(AgentName::ContentPlanner)
}
