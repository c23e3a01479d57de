use tracing::{debug, error};

use super::routing::{Route, TerminationReason, route_from};
use crate::agents::{
    Agent, AgentContext, AgentName, ContentCreator, ContentManagement, ContentPlanner,
    ContentReviewer, Router, SharedState, Supervisor, UserProxy,
};

/// 一轮执行的结果
#[derive(Debug)]
pub struct TurnOutcome {
    pub state: SharedState,
    pub termination: TerminationReason,
    pub mark_completed: bool,
    /// 最后执行的agent
    pub last_agent: AgentName,
}

/// agent图：从UserProxy出发，执行agent后由路由函数决定下一个节点
pub struct Graph {
    agents: Vec<Box<dyn Agent>>,
}

impl Graph {
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            agents: vec![
                Box::new(UserProxy),
                Box::new(Router::from_context(ctx)),
                Box::new(Supervisor),
                Box::new(ContentManagement),
                Box::new(ContentPlanner),
                Box::new(ContentCreator),
                Box::new(ContentReviewer),
            ],
        }
    }

    fn agent(&self, name: AgentName) -> Option<&dyn Agent> {
        self.agents
            .iter()
            .find(|agent| agent.name() == name)
            .map(|agent| agent.as_ref())
    }

    /// 执行一轮，直到路由结束或步数用尽
    pub async fn run(&self, mut state: SharedState, ctx: &AgentContext) -> TurnOutcome {
        let max_recursions = ctx.config.orchestrator.max_recursions;
        let max_steps = max_recursions as usize + 1;
        let mut current = AgentName::UserProxy;

        for _ in 0..max_steps {
            let Some(agent) = self.agent(current) else {
                return TurnOutcome {
                    state,
                    termination: TerminationReason::Unrouted(Some(current)),
                    mark_completed: false,
                    last_agent: current,
                };
            };

            if let Err(e) = agent.process(&mut state, ctx).await {
                error!("❌ {} 执行失败: {}", current, e);
                state.error = Some(e.to_string());
                return TurnOutcome {
                    state,
                    termination: TerminationReason::AgentFailed(e.to_string()),
                    mark_completed: false,
                    last_agent: current,
                };
            }

            let decision = route_from(current, &state, max_recursions);
            match decision.route {
                Route::Next(next) => {
                    debug!("➡️ {} -> {}", current, next);
                    current = next;
                }
                Route::End(termination) => {
                    debug!("🏁 {} 结束本轮: {}", current, termination);
                    return TurnOutcome {
                        state,
                        termination,
                        mark_completed: decision.mark_completed,
                        last_agent: current,
                    };
                }
            }
        }

        TurnOutcome {
            state,
            termination: TerminationReason::RecursionLimit,
            mark_completed: true,
            last_agent: current,
        }
    }
}
