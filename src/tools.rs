//! Tool registry for agent engines.
//!
//! Tools are advertised to the model through the prompt; execution happens
//! in the surrounding product. The registry only tracks what an agent is
//! allowed to see, filtered by its security policy.

use std::collections::BTreeMap;

use crate::policy::SecurityPolicy;

/// A tool the agent may be told about.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub needs_network: bool,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, needs_network: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            needs_network,
        }
    }
}

/// Registry of tools available to one agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Built-in tool set, filtered by the agent's policy.
    pub fn with_defaults(policy: &SecurityPolicy) -> Self {
        let mut registry = Self::new();
        registry.register(ToolSpec::new(
            "read_file",
            "Read a file inside your workspace",
            false,
        ));
        registry.register(ToolSpec::new(
            "write_file",
            "Write a file inside your workspace",
            false,
        ));
        registry.register(ToolSpec::new(
            "web_fetch",
            "Fetch a URL and return its text content",
            true,
        ));

        if !policy.allow_network {
            registry.tools.retain(|_, t| !t.needs_network);
        }

        registry
    }

    pub fn register(&mut self, tool: ToolSpec) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render the tool listing that goes into the engine prompt.
    pub fn render_prompt_section(&self) -> String {
        if self.tools.is_empty() {
            return String::new();
        }

        let mut out = String::from("Available tools:\n");
        for tool in self.tools.values() {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        out
    }
}
