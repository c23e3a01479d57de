//! 单轮对话中在agent之间传递的共享状态

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use uuid::Uuid;

use super::types::{AgentMessage, AgentName, ChatRole, ChatTurn, MessageType};

/// 至少需要这么多条执行记录才做循环检测
const MIN_LOOP_SAMPLE: usize = 4;

/// 共享状态
///
/// 由当前运行的一轮对话独占，每一步只有一个agent持有 `&mut`。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedState {
    /// 对话记录，只追加
    pub messages: Vec<ChatTurn>,
    /// 下一个要执行的agent
    pub current_agent: Option<AgentName>,
    /// agent信封，从不删除；通过 `processed_messages` 标记为已消费
    pub agent_messages: Vec<AgentMessage>,
    pub processed_messages: Vec<Uuid>,
    pub recursions: u32,

    pub knowledge_base_id: Option<String>,
    pub knowledge_base_name: Option<String>,
    pub article_id: Option<String>,
    pub current_section: Option<String>,

    pub task_context: Map<String, Value>,
    pub session_data: Map<String, Value>,

    pub user_intent: Option<String>,
    /// 0-100
    pub intent_confidence: Option<f64>,

    pub agent_sequence: VecDeque<AgentName>,
    pub loop_detected: bool,

    pub consecutive_tool_calls: u32,
    pub last_tool_result: Option<String>,

    pub revision_count: u32,
    pub error: Option<String>,

    /// 本轮的用户输入是否已经交给Router
    #[serde(skip)]
    pub input_forwarded: bool,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            current_agent: Some(AgentName::UserProxy),
            ..Default::default()
        }
    }

    /// 发送信封
    pub fn post(&mut self, message: AgentMessage) {
        self.agent_messages.push(message);
    }

    fn is_processed(&self, id: &Uuid) -> bool {
        self.processed_messages.contains(id)
    }

    /// 发给某个agent且尚未消费的信封（按发送顺序）
    pub fn pending_for(&self, agent: AgentName) -> Vec<&AgentMessage> {
        self.agent_messages
            .iter()
            .filter(|m| m.recipient == agent && !self.is_processed(&m.id))
            .collect()
    }

    pub fn has_pending(&self, agent: AgentName) -> bool {
        self.agent_messages
            .iter()
            .any(|m| m.recipient == agent && !self.is_processed(&m.id))
    }

    pub fn latest_pending(&self, agent: AgentName) -> Option<&AgentMessage> {
        self.agent_messages
            .iter()
            .rev()
            .find(|m| m.recipient == agent && !self.is_processed(&m.id))
    }

    /// 取出最新的待处理信封，同时把该agent其余待处理信封一并标记为已消费
    pub fn take_latest(&mut self, agent: AgentName) -> Option<AgentMessage> {
        let latest = self.latest_pending(agent).cloned()?;
        let ids: Vec<Uuid> = self.pending_for(agent).iter().map(|m| m.id).collect();
        self.processed_messages.extend(ids);
        Some(latest)
    }

    pub fn mark_processed(&mut self, agent: AgentName) {
        let ids: Vec<Uuid> = self.pending_for(agent).iter().map(|m| m.id).collect();
        self.processed_messages.extend(ids);
    }

    pub fn mark_all_processed(&mut self) {
        let ids: Vec<Uuid> = self
            .agent_messages
            .iter()
            .filter(|m| !self.is_processed(&m.id))
            .map(|m| m.id)
            .collect();
        self.processed_messages.extend(ids);
    }

    /// 记录一步执行：先对已有序列做循环检测，再递增计数并追加本agent
    ///
    /// 返回本步是否检测到循环。循环检测仅作提示，终止只由递归上限决定。
    pub fn increment_recursions(
        &mut self,
        agent: AgentName,
        window: usize,
        capacity: usize,
    ) -> bool {
        let previous = self.recursions as usize;
        let looped = previous >= window && detect_loop(&self.agent_sequence, window);

        self.recursions = self.recursions.saturating_add(1);
        self.agent_sequence.push_back(agent);
        while self.agent_sequence.len() > capacity.max(1) {
            self.agent_sequence.pop_front();
        }

        if looped {
            self.loop_detected = true;
        }
        looped
    }

    /// 最后一条非assistant的输入
    pub fn last_user_input(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|turn| turn.role != ChatRole::Assistant)
            .map(|turn| turn.content.as_str())
    }

    /// 最后一条对话是否为尚未回复的输入
    pub fn awaiting_reply(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|turn| turn.role != ChatRole::Assistant)
    }

    pub fn last_assistant_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::Assistant)
            .map(|turn| turn.content.as_str())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatTurn::assistant(content));
    }

    /// 最近 `limit` 条工作类信封中携带的意图
    pub fn recent_intents(&self, limit: usize) -> Vec<String> {
        self.agent_messages
            .iter()
            .filter(|m| {
                matches!(
                    m.message_type,
                    MessageType::WorkRequest | MessageType::WorkflowComplete
                )
            })
            .rev()
            .take(limit)
            .filter_map(|m| m.meta_str("intent").map(str::to_string))
            .collect()
    }

    pub fn knowledge_base_id_i64(&self) -> Option<i64> {
        self.knowledge_base_id
            .as_deref()
            .and_then(|id| id.trim().parse().ok())
    }

    pub fn article_id_i64(&self) -> Option<i64> {
        self.article_id
            .as_deref()
            .and_then(|id| id.trim().parse().ok())
    }

    /// 最近的对话，供提示词使用
    pub fn recent_conversation(&self, limit: usize) -> String {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages
            .iter()
            .skip(skip)
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 窗口内为同一agent重复，或严格的A-B交替
pub fn detect_loop(sequence: &VecDeque<AgentName>, window: usize) -> bool {
    let window = window.max(MIN_LOOP_SAMPLE);
    if sequence.len() < window {
        return false;
    }
    let tail: Vec<AgentName> = sequence.iter().skip(sequence.len() - window).copied().collect();

    if tail.iter().all(|agent| *agent == tail[0]) {
        return true;
    }

    let (a, b) = (tail[0], tail[1]);
    a != b
        && tail
            .iter()
            .enumerate()
            .all(|(i, agent)| *agent == if i % 2 == 0 { a } else { b })
}
