//! agentmesh library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod memory;
pub mod policy;
pub mod providers;
pub mod tools;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{AgentPool, InternalMessage, Orchestrator};
pub use engine::{Engine, EngineFactory, RunOptions};
pub use error::{Error, Result};
pub use memory::Memory;
pub use providers::Provider;
