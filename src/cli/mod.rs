//! CLI commands for agentmesh using clap.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{default_agent_id, load_settings};
use crate::core::{AgentPool, Orchestrator};

/// agentmesh - autonomous multi-agent runtime.
#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(version = "0.1.0")]
#[command(about = "Multi-agent runtime with mention routing and team orchestration", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the interactive runtime (REPL over all configured agents)
    Run,

    /// List configured agents
    Agents,

    /// List configured teams
    Teams,

    /// Show runtime configuration summary
    Status,
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run => run_interactive().await,
            Command::Agents => list_agents(),
            Command::Teams => list_teams(),
            Command::Status => show_status(),
        }
    }
}

async fn run_interactive() -> Result<()> {
    let settings = Arc::new(load_settings()?);
    let pool = Arc::new(AgentPool::new(settings.clone()));
    let orchestrator = Orchestrator::new(pool, settings);

    orchestrator.run_interactive().await?;
    Ok(())
}

fn list_agents() -> Result<()> {
    let settings = load_settings()?;

    if settings.agents.is_empty() {
        println!("No agents configured.");
        return Ok(());
    }

    let mut ids: Vec<&String> = settings.agents.keys().collect();
    ids.sort();

    for id in ids {
        let agent = &settings.agents[id];
        let provider = agent.provider.as_deref().unwrap_or(&settings.models.provider);
        let model = agent.model.as_deref().unwrap_or("default");
        println!("@{:<16} provider={:<10} model={}", id, provider, model);
    }

    Ok(())
}

fn list_teams() -> Result<()> {
    let settings = load_settings()?;

    if settings.teams.is_empty() {
        println!("No teams configured.");
        return Ok(());
    }

    let mut ids: Vec<&String> = settings.teams.keys().collect();
    ids.sort();

    for id in ids {
        let team = &settings.teams[id];
        let leader = team.leader_agent.as_deref().unwrap_or("-");
        println!(
            "@{:<16} leader=@{:<12} members: {}",
            id,
            leader,
            team.agents.join(", ")
        );
    }

    Ok(())
}

fn show_status() -> Result<()> {
    let settings = load_settings()?;

    println!("Agents:    {}", settings.agents.len());
    println!("Teams:     {}", settings.teams.len());
    println!(
        "Default:   {}",
        default_agent_id(&settings)
            .map(|id| format!("@{}", id))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Budget:    {} messages/conversation", settings.routing.max_internal_messages);
    println!(
        "Workspace: {}",
        crate::config::resolve_workspace_root(&settings).display()
    );

    Ok(())
}
