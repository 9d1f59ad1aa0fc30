//! Execution engines for agentmesh.
//!
//! An engine is the capability the orchestrator invokes to turn message
//! content into response text. There is one production implementation
//! ([`AgentEngine`], built from an agent's configuration) and tests supply
//! their own doubles through [`EngineFactory`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{resolve_workspace_root, AgentConfig, Settings};
use crate::error::{Error, Result};
use crate::memory::Memory;
use crate::policy::SecurityPolicy;
use crate::providers::{create_provider, Provider};
use crate::tools::ToolRegistry;

/// How many remembered exchanges are folded into the prompt.
const CONTEXT_EXCHANGES: usize = 12;

/// Per-call options the orchestrator passes to an engine.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub agent_id: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Execution engine capability.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Process one message and return the response text.
    async fn run(&self, content: &str, options: &RunOptions) -> Result<String>;
}

impl std::fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Engine")
    }
}

/// Builds engines for the pool. The production factory resolves the agent's
/// workspace, provider, memory, policy, and tools; tests inject scripted
/// factories instead.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn build(
        &self,
        agent_id: &str,
        config: &AgentConfig,
        settings: &Settings,
    ) -> Result<Arc<dyn Engine>>;
}

/// Production factory.
pub struct DefaultEngineFactory;

#[async_trait]
impl EngineFactory for DefaultEngineFactory {
    async fn build(
        &self,
        agent_id: &str,
        config: &AgentConfig,
        settings: &Settings,
    ) -> Result<Arc<dyn Engine>> {
        let engine = AgentEngine::build(agent_id, config, settings)?;
        Ok(Arc::new(engine))
    }
}

/// The production engine: provider + memory + policy + tools + workspace.
pub struct AgentEngine {
    agent_id: String,
    provider: Arc<dyn Provider>,
    memory: Memory,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    default_model: Option<String>,
    workspace: PathBuf,
}

impl AgentEngine {
    /// Resolve everything an agent needs and construct its engine.
    ///
    /// Any failure (unwritable workspace, unknown provider, memory init)
    /// aborts construction; the pool does not cache the failed id, so a
    /// later call can retry.
    pub fn build(agent_id: &str, config: &AgentConfig, settings: &Settings) -> Result<Self> {
        let workspace = config
            .working_directory
            .clone()
            .unwrap_or_else(|| resolve_workspace_root(settings).join(agent_id));
        std::fs::create_dir_all(&workspace)?;

        let provider_name = config
            .provider
            .clone()
            .unwrap_or_else(|| settings.models.provider.clone());
        if provider_name.is_empty() {
            return Err(Error::Config(format!(
                "agent '{}' has no provider and no global models.provider is set",
                agent_id
            )));
        }
        let provider = create_provider(&provider_name, config.api_key.clone(), settings)?;

        let memory = Memory::open(&workspace, agent_id)?;
        let policy = SecurityPolicy::for_agent(config, &workspace);
        let tools = ToolRegistry::with_defaults(&policy);

        tracing::debug!(
            "Built engine for agent '{}' (provider={}, workspace={})",
            agent_id,
            provider_name,
            workspace.display()
        );

        Ok(Self {
            agent_id: agent_id.to_string(),
            provider,
            memory,
            tools,
            system_prompt: config.system_prompt.clone(),
            default_model: config.model.clone(),
            workspace,
        })
    }

    /// Compose the full prompt: identity, tools, recent memory, then the
    /// incoming content.
    fn compose_prompt(&self, content: &str) -> String {
        let mut prompt = String::new();

        if let Some(system) = &self.system_prompt {
            prompt.push_str(system.trim());
            prompt.push_str("\n\n");
        }

        let tools = self.tools.render_prompt_section();
        if !tools.is_empty() {
            prompt.push_str(&tools);
            prompt.push('\n');
        }

        match self.memory.recent(CONTEXT_EXCHANGES) {
            Ok(recent) if !recent.is_empty() => {
                prompt.push_str("Recent exchanges:\n");
                for exchange in recent {
                    prompt.push_str(&format!("[{}] {}\n", exchange.role, exchange.content));
                }
                prompt.push('\n');
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Agent '{}': failed to load memory: {}", self.agent_id, e);
            }
        }

        prompt.push_str(content);
        prompt
    }
}

#[async_trait]
impl Engine for AgentEngine {
    async fn run(&self, content: &str, options: &RunOptions) -> Result<String> {
        let prompt = self.compose_prompt(content);
        let model = options.model.as_deref().or(self.default_model.as_deref());

        let response = self
            .provider
            .complete(&prompt, model, options.temperature, Some(&self.workspace))
            .await
            .map_err(|e| Error::Engine(format!("provider '{}': {}", self.provider.name(), e)))?;

        // Memory failures degrade the next prompt, not this response.
        if let Err(e) = self.memory.record("user", content) {
            tracing::warn!("Agent '{}': failed to record prompt: {}", self.agent_id, e);
        }
        if let Err(e) = self.memory.record("assistant", &response) {
            tracing::warn!("Agent '{}': failed to record response: {}", self.agent_id, e);
        }

        Ok(response)
    }
}
