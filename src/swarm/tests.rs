#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::agents::test_support::test_config;
    use crate::agents::{AgentContext, AgentName};
    use crate::config::{ClassifierStrategy, Config};
    use crate::gitlab::{GitLabClient, Issue};
    use crate::knowledge_base::MemoryKnowledgeBase;
    use crate::llm::ScriptedModel;
    use crate::orchestrator::Orchestrator;
    use crate::state::MemoryStateStore;
    use crate::swarm::{PROFILES, Swarm, reports_work};

    const CLASSIFIER_MARKER: &str = "You are an expert intent classifier";
    const USER_PROXY_MARKER: &str = "You are the UserProxy agent";

    fn inquiry_model(reply: &str) -> ScriptedModel {
        ScriptedModel::new("")
            .when(
                CLASSIFIER_MARKER,
                r#"{"intent": "general_inquiry", "confidence": 90}"#,
            )
            .when(USER_PROXY_MARKER, reply)
    }

    async fn swarm_with(
        model: ScriptedModel,
        config: Config,
        gitlab: Option<GitLabClient>,
    ) -> Swarm {
        let swarm_config = config.swarm.clone();
        let ctx = AgentContext::new(
            Arc::new(model),
            Arc::new(MemoryKnowledgeBase::new()),
            gitlab.map(Arc::new),
            Arc::new(config),
        );
        let orchestrator = Orchestrator::new(Arc::new(MemoryStateStore::new()), ctx);
        orchestrator.initialize().await.unwrap();
        Swarm::new(orchestrator, swarm_config)
    }

    #[test]
    fn test_profiles_cover_agents() {
        let agents: Vec<AgentName> = PROFILES.iter().map(|p| p.agent).collect();
        assert_eq!(agents.len(), 5);
        assert!(agents.contains(&AgentName::Supervisor));
        assert!(!agents.contains(&AgentName::Router));
        assert_eq!(PROFILES[0].labels, &["kb-management", "basic-operations"]);
    }

    #[test]
    fn test_discovery_message_mentions_claimed_issue() {
        let issue = Issue {
            id: 1003,
            iid: 3,
            title: "Organize onboarding".to_string(),
            description: Some("Split the guide".to_string()),
            state: "opened".to_string(),
            labels: vec!["planning".to_string()],
            web_url: String::new(),
            issue_type: None,
            created_at: None,
            updated_at: None,
        };
        let message = PROFILES[1].discovery_message(Some(&issue));
        assert!(message.contains("Labels: planning, architecture, strategy"));
        assert!(message.contains("claimed issue #3: Organize onboarding"));
        assert!(message.contains("Split the guide"));
    }

    #[test]
    fn test_reports_work() {
        assert!(reports_work("Found issue #4 and started on it"));
        assert!(reports_work("Now WORKING ON the review"));
        assert!(!reports_work("Nothing to do right now."));
    }

    #[tokio::test]
    async fn test_cycle_counts_work_from_replies() {
        let swarm = swarm_with(
            inquiry_model("Working on issue #2 now."),
            test_config(ClassifierStrategy::Llm),
            None,
        )
        .await;

        assert!(swarm.run_cycle().await);

        let status = swarm.status().await;
        assert_eq!(status.cycle_count, 1);
        assert!(!status.is_running);
        assert!(status.session_active);
    }

    #[tokio::test]
    async fn test_cycle_idle_without_work() {
        let swarm = swarm_with(
            inquiry_model("Nothing to do right now."),
            test_config(ClassifierStrategy::Llm),
            None,
        )
        .await;

        assert!(!swarm.run_cycle().await);
    }

    #[tokio::test]
    async fn test_cycle_claims_labelled_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1003,
                "iid": 3,
                "title": "Tidy the KB",
                "description": "",
                "state": "opened",
                "labels": ["kb-management"],
                "web_url": "http://gitlab.local/issues/3"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v4/projects/7/issues/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1003,
                "iid": 3,
                "title": "Tidy the KB",
                "labels": ["kb-management", "in-progress"]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/7/issues/3/notes"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": 9, "body": "claimed"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(ClassifierStrategy::Llm);
        config.gitlab.default_project_id = Some("7".to_string());
        let gitlab = GitLabClient::new(&server.uri(), "glpat-test").unwrap();
        let swarm = swarm_with(inquiry_model("Nothing to do right now."), config, Some(gitlab)).await;

        assert!(swarm.run_cycle().await);
    }

    #[tokio::test]
    async fn test_run_continuous_stops() {
        let mut config = test_config(ClassifierStrategy::Llm);
        config.swarm.cycle_interval_secs = 3600;
        let swarm = Arc::new(
            swarm_with(inquiry_model("Nothing to do right now."), config, None).await,
        );

        let handle = swarm.start();

        for _ in 0..200 {
            if swarm.status().await.cycle_count >= 1 && swarm.status().await.is_running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        swarm.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("swarm did not stop")
            .unwrap();
        assert!(!swarm.status().await.is_running);
    }

    #[tokio::test]
    async fn test_stop_before_loop_starts_is_honoured() {
        let swarm = swarm_with(
            inquiry_model("Nothing to do right now."),
            test_config(ClassifierStrategy::Llm),
            None,
        )
        .await;

        swarm.stop();
        tokio::time::timeout(Duration::from_secs(5), swarm.run_continuous())
            .await
            .expect("swarm ignored the earlier stop");

        let status = swarm.status().await;
        assert_eq!(status.cycle_count, 0);
        assert!(!status.is_running);
    }

    #[tokio::test]
    async fn test_start_clears_previous_stop() {
        let mut config = test_config(ClassifierStrategy::Llm);
        config.swarm.cycle_interval_secs = 3600;
        let swarm = Arc::new(
            swarm_with(inquiry_model("Nothing to do right now."), config, None).await,
        );
        swarm.stop();

        let handle = swarm.start();
        for _ in 0..200 {
            if swarm.status().await.cycle_count >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(swarm.status().await.cycle_count, 1);

        swarm.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("swarm did not stop")
            .unwrap();
    }
}
