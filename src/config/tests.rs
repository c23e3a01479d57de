#[cfg(test)]
mod tests {
    use crate::config::{
        ClassifierStrategy, Config, LLMConfig, LLMProvider, OrchestratorConfig, SwarmConfig,
    };
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert!(!config.in_memory);
        assert!(!config.verbose);
        assert_eq!(config.orchestrator.max_recursions, 50);
        assert_eq!(config.orchestrator.classifier, ClassifierStrategy::Llm);
        assert!(config.gitlab.default_project_id.is_none());
    }

    #[test]
    fn test_llm_provider_default() {
        let provider = LLMProvider::default();
        assert_eq!(provider, LLMProvider::OpenAI);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!("Azure".parse::<LLMProvider>().unwrap(), LLMProvider::Azure);
        assert_eq!(
            "azure-openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::Azure
        );
        assert_eq!(
            "deepseek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::Azure.to_string(), "azure");
        assert_eq!(LLMProvider::DeepSeek.to_string(), "deepseek");
        assert_eq!(LLMProvider::Anthropic.to_string(), "anthropic");
        assert_eq!(LLMProvider::Ollama.to_string(), "ollama");
    }

    #[test]
    fn test_classifier_strategy_from_str() {
        assert_eq!(
            "keyword".parse::<ClassifierStrategy>().unwrap(),
            ClassifierStrategy::Keyword
        );
        assert_eq!(
            "LLM".parse::<ClassifierStrategy>().unwrap(),
            ClassifierStrategy::Llm
        );
        assert!("bayes".parse::<ClassifierStrategy>().is_err());
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        assert_eq!(config.provider, LLMProvider::OpenAI);
        // api_key may be empty if env var is not set
        assert!(!config.api_base_url.is_empty());
        assert!(!config.model_efficient.is_empty());
        assert!(!config.model_powerful.is_empty());
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay_ms, 5000);
        assert_eq!(config.max_tool_turns, 5);
    }

    #[test]
    fn test_orchestrator_and_swarm_defaults() {
        let orchestrator = OrchestratorConfig::default();
        assert_eq!(orchestrator.history_limit, 50);
        assert_eq!(orchestrator.loop_window, 5);
        assert_eq!(orchestrator.sequence_capacity, 10);
        assert_eq!(orchestrator.supervisor_reset_threshold, 12);
        assert_eq!(orchestrator.max_revisions, 2);

        let swarm = SwarmConfig::default();
        assert_eq!(swarm.cycle_interval_secs, 30);
        assert_eq!(swarm.max_idle_cycles, 5);
        assert_eq!(swarm.idle_multiplier, 3);
    }

    #[test]
    fn test_azure_base_url() {
        let mut config = LLMConfig::default();
        config.provider = LLMProvider::Azure;
        config.api_base_url = "https://my-resource.openai.azure.com/".to_string();
        assert_eq!(
            config.effective_base_url(),
            "https://my-resource.openai.azure.com/openai/v1"
        );

        config.api_base_url = "https://my-resource.openai.azure.com/openai/v1".to_string();
        assert_eq!(
            config.effective_base_url(),
            "https://my-resource.openai.azure.com/openai/v1"
        );

        config.provider = LLMProvider::OpenAI;
        config.api_base_url = "https://api.openai.com/v1/".to_string();
        assert_eq!(config.effective_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_gitlab_enabled() {
        let mut config = Config::default();
        config.gitlab.token = None;
        assert!(!config.gitlab_enabled());

        config.gitlab.token = Some("   ".to_string());
        assert!(!config.gitlab_enabled());

        config.gitlab.token = Some("glpat-xxxx".to_string());
        assert!(config.gitlab_enabled());
    }

    #[test]
    fn test_config_from_file_partial() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("kb-agents.toml");

        let content = r#"
verbose = true

[llm]
provider = "deepseek"
api_key = "sk-test"
api_base_url = "https://api.deepseek.com"
model_efficient = "deepseek-chat"
model_powerful = "deepseek-reasoner"

[orchestrator]
max_recursions = 20
classifier = "keyword"

[swarm]
cycle_interval_secs = 5
"#;
        std::fs::write(&config_path, content).unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert!(config.verbose);
        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.model_powerful, "deepseek-reasoner");
        // 未出现的字段使用默认值
        assert_eq!(config.llm.retry_attempts, 5);
        assert_eq!(config.orchestrator.max_recursions, 20);
        assert_eq!(config.orchestrator.classifier, ClassifierStrategy::Keyword);
        assert_eq!(config.orchestrator.max_revisions, 2);
        assert_eq!(config.swarm.cycle_interval_secs, 5);
        assert_eq!(config.swarm.idle_multiplier, 3);
    }

    #[test]
    fn test_config_from_file_missing() {
        let result = Config::from_file(Path::new("/definitely/not/here/kb-agents.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_file_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        std::fs::write(&config_path, "[llm\nprovider = ").unwrap();

        let result = Config::from_file(&config_path);
        assert!(result.is_err());
    }
}
