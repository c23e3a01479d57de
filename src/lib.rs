pub mod agents;
pub mod cli;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod knowledge_base;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod state;
pub mod swarm;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::Orchestrator;
