//! Configuration loading for agentmesh.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the agentmesh home directory (~/.agentmesh).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentmesh"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.agentmesh/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Create it before starting the runtime.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if let Some(default_agent) = settings.routing.default_agent.as_deref() {
        if !settings.agents.contains_key(default_agent) {
            return Err(Error::Config(format!(
                "routing.default_agent '{}' not found in settings.agents",
                default_agent
            )));
        }
    }

    for (team_id, team) in &settings.teams {
        if let Some(leader) = team.leader_agent.as_deref() {
            if !settings.agents.contains_key(leader) {
                return Err(Error::Config(format!(
                    "teams.{}.leader_agent '{}' not found in settings.agents",
                    team_id, leader
                )));
            }
        }
    }

    Ok(())
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Resolve the default agent for unrouted input.
///
/// Preference order: configured `routing.default_agent`, then an agent
/// named `assistant`, then the first agent id in sorted order.
pub fn default_agent_id(settings: &Settings) -> Option<String> {
    if let Some(id) = settings.routing.default_agent.as_deref() {
        if settings.agents.contains_key(id) {
            return Some(id.to_string());
        }
    }

    if settings.agents.contains_key("assistant") {
        return Some("assistant".to_string());
    }

    // Stable fallback.
    let mut ids: Vec<String> = settings.agents.keys().cloned().collect();
    ids.sort();
    ids.into_iter().next()
}

/// Determine workspace root from settings or fallback to ~/agentmesh-workspace.
pub fn resolve_workspace_root(settings: &Settings) -> PathBuf {
    settings
        .workspace
        .path
        .clone()
        .or_else(|| directories::UserDirs::new().map(|u| u.home_dir().join("agentmesh-workspace")))
        .unwrap_or_else(|| PathBuf::from("./agentmesh-workspace"))
}

/// Workspace configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Workspace {
    pub path: Option<PathBuf>,
    pub name: Option<String>,
}

/// Agent configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AgentConfig {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub working_directory: Option<PathBuf>,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
}

/// Team configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TeamConfig {
    pub name: String,
    pub agents: Vec<String>,
    pub leader_agent: Option<String>,
    pub description: Option<String>,
}

/// Provider model configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderModel {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Models configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Models {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub openai: ProviderModel,
    #[serde(default)]
    pub ollama: ProviderModel,
}

/// Routing configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Routing {
    pub default_agent: Option<String>,

    /// Per-conversation message budget. Once a conversation has processed
    /// this many internal messages, further ones are silently dropped.
    #[serde(default = "default_max_internal_messages")]
    pub max_internal_messages: usize,
}

fn default_max_internal_messages() -> usize {
    16
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            default_agent: None,
            max_internal_messages: default_max_internal_messages(),
        }
    }
}

/// Agentmesh settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub workspace: Workspace,

    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,

    #[serde(default)]
    pub teams: HashMap<String, TeamConfig>,

    #[serde(default)]
    pub models: Models,

    #[serde(default)]
    pub routing: Routing,
}
