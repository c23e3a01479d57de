//! 每个agent执行完之后的路由决策
//!
//! 路由函数只读共享状态，不做任何修改。

use std::fmt;

use crate::agents::{AgentName, SharedState};
use crate::state::ConversationState;

/// 一轮对话结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    RecursionLimit,
    /// 下一个agent没有待处理的信封
    NoPendingMessage(AgentName),
    /// `current_agent` 不是当前节点允许的去向
    Unrouted(Option<AgentName>),
    SessionCompleted,
    AgentFailed(String),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::RecursionLimit => write!(f, "recursion limit reached"),
            TerminationReason::NoPendingMessage(agent) => {
                write!(f, "no pending message for {}", agent)
            }
            TerminationReason::Unrouted(Some(agent)) => write!(f, "unrouted agent {}", agent),
            TerminationReason::Unrouted(None) => write!(f, "no current agent"),
            TerminationReason::SessionCompleted => write!(f, "session already completed"),
            TerminationReason::AgentFailed(e) => write!(f, "agent failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Next(AgentName),
    End(TerminationReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    /// 是否需要把会话标记为completed
    pub mark_completed: bool,
}

impl RouteDecision {
    fn next(agent: AgentName) -> Self {
        Self {
            route: Route::Next(agent),
            mark_completed: false,
        }
    }

    fn end(reason: TerminationReason) -> Self {
        Self {
            route: Route::End(reason),
            mark_completed: false,
        }
    }

    fn recursion_limit() -> Self {
        Self {
            route: Route::End(TerminationReason::RecursionLimit),
            mark_completed: true,
        }
    }
}

fn limit_reached(state: &SharedState, max_recursions: u32) -> bool {
    state.recursions >= max_recursions
}

/// 候选agent有待处理信封才继续；Supervisor没有信封时自行分派
fn candidate(state: &SharedState, agent: AgentName) -> RouteDecision {
    if agent == AgentName::Supervisor || state.has_pending(agent) {
        RouteDecision::next(agent)
    } else {
        RouteDecision::end(TerminationReason::NoPendingMessage(agent))
    }
}

/// current_agent在允许的去向中则转交，否则结束
fn route_among(state: &SharedState, max_recursions: u32, allowed: &[AgentName]) -> RouteDecision {
    if limit_reached(state, max_recursions) {
        return RouteDecision::recursion_limit();
    }
    match state.current_agent {
        Some(agent) if allowed.contains(&agent) => candidate(state, agent),
        other => RouteDecision::end(TerminationReason::Unrouted(other)),
    }
}

fn session_completed(state: &SharedState) -> bool {
    state
        .session_data
        .get("conversation_state")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s == ConversationState::Completed.as_str())
}

pub fn route_from_user_proxy(state: &SharedState, max_recursions: u32) -> RouteDecision {
    if session_completed(state) {
        return RouteDecision::end(TerminationReason::SessionCompleted);
    }
    route_among(
        state,
        max_recursions,
        &[AgentName::Router, AgentName::UserProxy],
    )
}

pub fn route_from_router(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[
            AgentName::UserProxy,
            AgentName::Supervisor,
            AgentName::ContentManagement,
            AgentName::ContentPlanner,
        ],
    )
}

pub fn route_from_supervisor(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[AgentName::UserProxy, AgentName::ContentManagement],
    )
}

pub fn route_from_content_management(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[AgentName::UserProxy, AgentName::Supervisor],
    )
}

pub fn route_from_planner(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[AgentName::UserProxy, AgentName::ContentCreator],
    )
}

pub fn route_from_creator(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[AgentName::ContentReviewer, AgentName::ContentCreator],
    )
}

pub fn route_from_reviewer(state: &SharedState, max_recursions: u32) -> RouteDecision {
    route_among(
        state,
        max_recursions,
        &[AgentName::UserProxy, AgentName::ContentCreator],
    )
}

/// 按刚执行完的agent选择路由函数
pub fn route_from(agent: AgentName, state: &SharedState, max_recursions: u32) -> RouteDecision {
    match agent {
        AgentName::UserProxy => route_from_user_proxy(state, max_recursions),
        AgentName::Router => route_from_router(state, max_recursions),
        AgentName::Supervisor => route_from_supervisor(state, max_recursions),
        AgentName::ContentManagement => route_from_content_management(state, max_recursions),
        AgentName::ContentPlanner => route_from_planner(state, max_recursions),
        AgentName::ContentCreator => route_from_creator(state, max_recursions),
        AgentName::ContentReviewer => route_from_reviewer(state, max_recursions),
    }
}
