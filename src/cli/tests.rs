#[cfg(test)]
mod tests {
    use crate::cli::commands::SwarmCommand;
    use crate::cli::{Args, ChatCommand, Command, SessionAction};
    use crate::config::{ClassifierStrategy, LLMProvider};
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_args_default_to_chat() {
        let args = Args::try_parse_from(["kb-agents"]).unwrap();

        assert_eq!(args.command(), Command::Chat { session_id: None });
        assert!(!args.memory);
        assert!(!args.verbose);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_swarm_once() {
        let args = Args::try_parse_from(["kb-agents", "swarm", "--once"]).unwrap();
        assert_eq!(args.command(), Command::Swarm { once: true });
    }

    #[test]
    fn test_session_subcommands() {
        let args = Args::try_parse_from([
            "kb-agents",
            "session",
            "audit",
            "--limit",
            "5",
            "--session-id",
            "session_abc",
        ])
        .unwrap();
        assert_eq!(
            args.command(),
            Command::Session {
                action: SessionAction::Audit { limit: 5 },
                session_id: Some("session_abc".to_string()),
            }
        );

        let args =
            Args::try_parse_from(["kb-agents", "session", "--session-id", "s1", "clear"]).unwrap();
        assert!(matches!(
            args.command(),
            Command::Session {
                action: SessionAction::Clear,
                ..
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "kb-agents",
            "chat",
            "--memory",
            "--classifier",
            "keyword",
            "--max-recursions",
            "20",
            "-v",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert!(config.in_memory);
        assert!(config.verbose);
        assert_eq!(config.orchestrator.classifier, ClassifierStrategy::Keyword);
        assert_eq!(config.orchestrator.max_recursions, 20);
    }

    #[test]
    fn test_into_config_llm_overrides() {
        let args = Args::try_parse_from([
            "kb-agents",
            "--llm-provider",
            "deepseek",
            "--llm-api-key",
            "sk-test",
            "--llm-api-base-url",
            "https://api.deepseek.com",
            "--model",
            "deepseek-chat",
            "--database-url",
            "postgres://u:p@db/kb",
            "--gitlab-project",
            "group/kb",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.api_base_url, "https://api.deepseek.com");
        assert_eq!(config.llm.model_efficient, "deepseek-chat");
        assert_eq!(config.llm.model_powerful, "deepseek-chat");
        assert_eq!(config.database.url, "postgres://u:p@db/kb");
        assert_eq!(config.gitlab.default_project_id.as_deref(), Some("group/kb"));
    }

    #[test]
    fn test_unknown_classifier_is_an_error() {
        let args = Args::try_parse_from(["kb-agents", "--classifier", "magic"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_into_config_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[orchestrator]\nmax_recursions = 12\n\n[swarm]\ncycle_interval_secs = 60"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from(["kb-agents", "--config", &path]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.orchestrator.max_recursions, 12);
        assert_eq!(config.swarm.cycle_interval_secs, 60);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args =
            Args::try_parse_from(["kb-agents", "--config", "/nonexistent/kb-agents.toml"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_chat_command_parse() {
        assert_eq!(ChatCommand::parse("  "), ChatCommand::Empty);
        assert_eq!(ChatCommand::parse("/q"), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("/QUIT"), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("/r"), ChatCommand::Reset);
        assert_eq!(ChatCommand::parse("/agents"), ChatCommand::Agents);
        assert_eq!(ChatCommand::parse("/audit"), ChatCommand::Audit);
        assert_eq!(
            ChatCommand::parse(" use kb 1 "),
            ChatCommand::Message("use kb 1".to_string())
        );
    }

    #[test]
    fn test_swarm_command_parse() {
        assert_eq!(SwarmCommand::parse("start"), SwarmCommand::Start);
        assert_eq!(SwarmCommand::parse(" Status "), SwarmCommand::Status);
        assert_eq!(SwarmCommand::parse("q"), SwarmCommand::Quit);
        assert_eq!(SwarmCommand::parse("dance"), SwarmCommand::Unknown);
    }
}
