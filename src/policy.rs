//! Per-agent security policy.
//!
//! Confines an agent's filesystem reach to its workspace and gates
//! network-using tools. Resolved once at engine construction.

use std::path::{Path, PathBuf};

use crate::config::AgentConfig;

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    workspace_root: PathBuf,
    pub allow_network: bool,
}

impl SecurityPolicy {
    /// Build the policy for one agent. The workspace directory must already
    /// exist (engine construction creates it first).
    pub fn for_agent(_config: &AgentConfig, workspace: &Path) -> Self {
        Self {
            workspace_root: workspace.to_path_buf(),
            allow_network: true,
        }
    }

    /// Whether a path falls inside the agent workspace.
    pub fn allows_path(&self, path: &Path) -> bool {
        // Canonicalize both sides so `..` segments cannot escape.
        let root = match self.workspace_root.canonicalize() {
            Ok(p) => p,
            Err(_) => return false,
        };
        match path.canonicalize() {
            Ok(p) => p.starts_with(&root),
            Err(_) => {
                // Not yet created: judge by the parent that does exist.
                path.parent()
                    .and_then(|p| p.canonicalize().ok())
                    .map(|p| p.starts_with(&root))
                    .unwrap_or(false)
            }
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
