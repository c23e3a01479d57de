//! 自治swarm：各agent定期从GitLab发现工作并交给编排器处理

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agents::AgentName;
use crate::config::SwarmConfig;
use crate::gitlab::Issue;
use crate::orchestrator::Orchestrator;

/// 回复中出现这些短语视为发现了工作
const WORK_FOUND_PHRASES: [&str; 7] = [
    "found issue",
    "processing",
    "assigned",
    "working on",
    "started",
    "updated",
    "completing",
];

/// 一个agent关心的工作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwarmProfile {
    pub agent: AgentName,
    pub labels: &'static [&'static str],
    pub priorities: &'static [&'static str],
    pub focus: &'static str,
}

pub const PROFILES: [SwarmProfile; 5] = [
    SwarmProfile {
        agent: AgentName::ContentManagement,
        labels: &["kb-management", "basic-operations"],
        priorities: &["high", "urgent"],
        focus: "KB CRUD operations and GitLab work tracking",
    },
    SwarmProfile {
        agent: AgentName::ContentPlanner,
        labels: &["planning", "architecture", "strategy"],
        priorities: &["high", "medium"],
        focus: "Strategic planning and sprint coordination",
    },
    SwarmProfile {
        agent: AgentName::ContentCreator,
        labels: &["content-creation", "development", "writing"],
        priorities: &["medium", "high"],
        focus: "Content generation and development tasks",
    },
    SwarmProfile {
        agent: AgentName::ContentReviewer,
        labels: &["review", "qa", "quality-assurance"],
        priorities: &["high", "urgent"],
        focus: "Quality assurance and content optimization",
    },
    SwarmProfile {
        agent: AgentName::Supervisor,
        labels: &["coordination", "scrum", "management"],
        priorities: &["urgent", "high"],
        focus: "Coordination of the agent team and quality gates",
    },
];

impl SwarmProfile {
    pub fn label_strings(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_string()).collect()
    }

    /// 交给编排器的工作发现消息
    pub fn discovery_message(&self, claimed: Option<&Issue>) -> String {
        let mut message = format!(
            "Check GitLab for work items assigned to {agent}.\n\
             Search criteria:\n\
             - Agent: {agent_lower}\n\
             - Labels: {labels}\n\
             - Priorities: {priorities}\n\
             - Focus area: {focus}\n\n\
             Look for open issues assigned to or labeled for this agent, high priority items and blocked work.\n\
             If work is found, process the highest priority item and update GitLab with progress.\n\
             Report specific work item details in your response.",
            agent = self.agent,
            agent_lower = self.agent.as_str().to_lowercase(),
            labels = self.labels.join(", "),
            priorities = self.priorities.join(", "),
            focus = self.focus,
        );
        if let Some(issue) = claimed {
            message.push_str(&format!(
                "\n\nYou have claimed issue #{}: {}\n{}",
                issue.iid,
                issue.title,
                issue.description.as_deref().unwrap_or_default()
            ));
        }
        message
    }
}

pub fn reports_work(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    WORK_FOUND_PHRASES.iter().any(|p| lowered.contains(p))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SwarmStatus {
    pub is_running: bool,
    pub cycle_count: u64,
    pub session_active: bool,
}

pub struct Swarm {
    orchestrator: Orchestrator,
    config: SwarmConfig,
    running: AtomicBool,
    cycle_count: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

impl Swarm {
    pub fn new(orchestrator: Orchestrator, config: SwarmConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            orchestrator,
            config,
            running: AtomicBool::new(false),
            cycle_count: AtomicU64::new(0),
            stop_tx,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// 认领一个带有该agent标签的issue（GitLab可用时）
    async fn claim_work(&self, profile: &SwarmProfile) -> Result<Option<Issue>> {
        let ctx = self.orchestrator.context();
        let (Some(gitlab), Some(project_id)) = (
            ctx.gitlab.as_ref(),
            ctx.config.gitlab.default_project_id.as_deref(),
        ) else {
            return Ok(None);
        };

        let Some(issue) = gitlab
            .find_open_issue_with_labels(project_id, &profile.label_strings())
            .await?
        else {
            return Ok(None);
        };
        let claimed = gitlab.claim_issue(project_id, &issue, profile.agent).await?;
        println!("      📌 认领 issue #{}: {}", claimed.iid, claimed.title);
        Ok(Some(claimed))
    }

    async fn discover(&self, profile: &SwarmProfile) -> Result<bool> {
        let claimed = self.claim_work(profile).await?;
        let reply = self
            .orchestrator
            .process_message(&profile.discovery_message(claimed.as_ref()), "system")
            .await?;
        let found = claimed.is_some() || reports_work(&reply);
        if found {
            println!("    ✅ 发现并处理工作");
            debug!("{} 回复: {}", profile.agent, reply);
        } else {
            println!("    💤 没有可处理的工作");
        }
        Ok(found)
    }

    /// 执行一轮：每个profile检查一次工作，返回是否有agent发现了工作
    pub async fn run_cycle(&self) -> bool {
        let cycle = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "🔄 自治周期 #{} - {}",
            cycle,
            chrono::Local::now().format("%H:%M:%S")
        );

        let mut with_work = 0;
        for profile in PROFILES.iter() {
            println!("  📋 {}: 检查GitLab工作项 ({})", profile.agent, profile.focus);
            match self.discover(profile).await {
                Ok(true) => with_work += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("❌ {} 工作发现失败: {}", profile.agent, e);
                    println!("    ❌ 错误: {}", e);
                }
            }
        }
        println!("📊 本轮 {}/{} 个agent发现工作", with_work, PROFILES.len());
        with_work > 0
    }

    /// 清除停止信号后在后台任务中持续运行
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.stop_tx.send_replace(false);
        let swarm = Arc::clone(self);
        tokio::spawn(async move { swarm.run_continuous().await })
    }

    /// 持续运行直到 `stop()`，运行前已发出的停止信号同样生效
    pub async fn run_continuous(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            println!("🛑 自治模式已停止");
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let interval = Duration::from_secs(self.config.cycle_interval_secs);
        let mut idle_cycles = 0u32;
        println!(
            "🚀 自治模式启动, 周期间隔 {} 秒",
            self.config.cycle_interval_secs
        );

        while !*stop_rx.borrow() {
            let wait = if self.run_cycle().await {
                idle_cycles = 0;
                println!("🎯 工作进行中, {} 秒后再次检查", interval.as_secs());
                interval
            } else {
                idle_cycles += 1;
                if idle_cycles >= self.config.max_idle_cycles {
                    idle_cycles = 0;
                    let extended = interval * self.config.idle_multiplier.max(1);
                    println!("💤 长时间空闲, {} 秒后再次检查", extended.as_secs());
                    extended
                } else {
                    println!("💤 暂无工作, {} 秒后再次检查", interval.as_secs());
                    interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        println!("🛑 自治模式已停止");
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub async fn status(&self) -> SwarmStatus {
        let session_active = match self.orchestrator.session_summary().await {
            Ok(summary) => summary.is_active,
            Err(e) => {
                debug!("读取会话摘要失败: {}", e);
                false
            }
        };
        SwarmStatus {
            is_running: self.running.load(Ordering::SeqCst),
            cycle_count: self.cycle_count.load(Ordering::SeqCst),
            session_active,
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
