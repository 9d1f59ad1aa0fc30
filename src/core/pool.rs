//! Agent pool: lazy, shared construction of per-agent execution engines.
//!
//! Engines are expensive to build (provider client, memory backend, tool
//! registry, workspace directory), so the pool caches them by agent id and
//! guarantees exactly one construction per id even under concurrent first
//! requests. Configuration is snapshotted at construction; the pool does
//! not hot-reload.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{AgentConfig, Settings, TeamConfig};
use crate::engine::{DefaultEngineFactory, Engine, EngineFactory};
use crate::error::{Error, Result};

pub struct AgentPool {
    settings: Arc<Settings>,
    agents: HashMap<String, AgentConfig>,
    teams: HashMap<String, TeamConfig>,
    factory: Box<dyn EngineFactory>,

    // Held across construction so concurrent first calls for the same id
    // cannot build twice. Queue operations never touch this lock.
    engines: Mutex<HashMap<String, Arc<dyn Engine>>>,
}

impl AgentPool {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_factory(settings, Box::new(DefaultEngineFactory))
    }

    pub fn with_factory(settings: Arc<Settings>, factory: Box<dyn EngineFactory>) -> Self {
        let agents = settings.agents.clone();
        let teams = settings.teams.clone();
        Self {
            settings,
            agents,
            teams,
            factory,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached engine for an agent, constructing it on first use.
    ///
    /// Construction failures propagate and are not cached, so a later call
    /// can retry.
    pub async fn get_or_create(&self, agent_id: &str) -> Result<Arc<dyn Engine>> {
        let mut engines = self.engines.lock().await;

        if let Some(engine) = engines.get(agent_id) {
            return Ok(engine.clone());
        }

        let config = self
            .agents
            .get(agent_id)
            .ok_or_else(|| Error::Config(format!("unknown agent: {}", agent_id)))?;

        tracing::info!("Constructing engine for agent '{}'", agent_id);
        let engine = self
            .factory
            .build(agent_id, config, &self.settings)
            .await?;

        engines.insert(agent_id.to_string(), engine.clone());
        Ok(engine)
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn has_team(&self, team_id: &str) -> bool {
        self.teams.contains_key(team_id)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn team_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.teams.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Leader agent id for a team; empty string if the team is unknown or
    /// has no leader.
    pub fn team_leader(&self, team_id: &str) -> String {
        self.teams
            .get(team_id)
            .and_then(|t| t.leader_agent.clone())
            .unwrap_or_default()
    }

    /// Member agent ids for a team; empty if unknown.
    pub fn team_members(&self, team_id: &str) -> Vec<String> {
        self.teams
            .get(team_id)
            .map(|t| t.agents.clone())
            .unwrap_or_default()
    }

    /// Agent configuration snapshot, if the agent exists.
    pub fn agent_config(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.get(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::engine::RunOptions;

    struct EchoEngine;

    #[async_trait]
    impl Engine for EchoEngine {
        async fn run(&self, content: &str, _options: &RunOptions) -> Result<String> {
            Ok(format!("echo: {}", content))
        }
    }

    struct CountingFactory {
        builds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EngineFactory for CountingFactory {
        async fn build(
            &self,
            _agent_id: &str,
            _config: &AgentConfig,
            _settings: &Settings,
        ) -> Result<Arc<dyn Engine>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            // Widen the race window: a second caller must still get the
            // cached engine, not a second construction.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(Arc::new(EchoEngine))
        }
    }

    fn settings_with_agents(ids: &[&str]) -> Arc<Settings> {
        let mut settings = Settings::default();
        for id in ids {
            settings
                .agents
                .insert(id.to_string(), AgentConfig::default());
        }
        settings.teams.insert(
            "dev".to_string(),
            TeamConfig {
                name: "Dev Team".to_string(),
                agents: ids.iter().map(|s| s.to_string()).collect(),
                leader_agent: ids.first().map(|s| s.to_string()),
                description: None,
            },
        );
        Arc::new(settings)
    }

    fn pool_with_counter(ids: &[&str]) -> (Arc<AgentPool>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            builds: builds.clone(),
        };
        let pool = AgentPool::with_factory(settings_with_agents(ids), Box::new(factory));
        (Arc::new(pool), builds)
    }

    #[tokio::test]
    async fn test_unknown_agent_errors() {
        let (pool, builds) = pool_with_counter(&["coder"]);
        let err = pool.get_or_create("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: unknown agent: ghost");
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        // A failed lookup is not cached as anything; the real agent still works.
        assert!(pool.get_or_create("coder").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_construction_is_idempotent() {
        let (pool, builds) = pool_with_counter(&["coder"]);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_create("coder").await.unwrap()
            }));
        }

        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        // All callers share the same engine handle.
        for engine in &engines[1..] {
            assert!(Arc::ptr_eq(engine, &engines[0]));
        }
    }

    #[tokio::test]
    async fn test_team_accessors() {
        let (pool, _) = pool_with_counter(&["coder", "reviewer"]);

        assert!(pool.has_agent("coder"));
        assert!(!pool.has_agent("ghost"));
        assert!(pool.has_team("dev"));
        assert!(!pool.has_team("ops"));

        assert_eq!(pool.agent_ids(), vec!["coder", "reviewer"]);
        assert_eq!(pool.team_ids(), vec!["dev"]);
        assert_eq!(pool.team_leader("dev"), "coder");
        assert_eq!(pool.team_leader("ops"), "");
        assert_eq!(pool.team_members("dev"), vec!["coder", "reviewer"]);
        assert!(pool.team_members("ops").is_empty());
    }
}
