//! Conversation tracking for agentmesh.
//!
//! Handles:
//! - Tracking the thread of internal messages descended from one submission
//! - Loop protection via a per-conversation message budget
//! - In-flight (pending) message counts

use std::collections::HashMap;

/// One logical thread of agent-to-agent exchanges started by one external
/// submission.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Unique conversation ID ("conv-<n>").
    pub id: String,

    /// First target agent id.
    pub originator: String,

    /// Channel the submission arrived on (cli, api, ...).
    pub origin_channel: String,

    /// Who submitted the original input.
    pub origin_sender: String,

    /// In-flight messages belonging to this conversation.
    pub pending_count: usize,

    /// Cumulative message count. Monotonically increasing, never reset.
    pub total_messages: usize,

    /// Reserved for future use; not currently transitioned.
    pub complete: bool,

    /// When the conversation started (unix millis).
    pub created_at: i64,
}

impl Conversation {
    pub fn new(id: &str, originator: &str, channel: &str, sender: &str) -> Self {
        Self {
            id: id.to_string(),
            originator: originator.to_string(),
            origin_channel: channel.to_string(),
            origin_sender: sender.to_string(),
            pending_count: 1,
            total_messages: 0,
            complete: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether the message budget is exhausted.
    pub fn budget_exhausted(&self, max_internal_messages: usize) -> bool {
        self.total_messages >= max_internal_messages
    }
}

/// Table of conversations keyed by id.
///
/// Entries are never removed: completed conversations stay queryable for the
/// orchestrator's lifetime, so long-running processes accumulate entries.
/// That growth is an accepted operational limit of the current design.
#[derive(Default)]
pub struct ConversationTable {
    conversations: HashMap<String, Conversation>,
}

impl ConversationTable {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
        }
    }

    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id.clone(), conversation);
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Count conversations with in-flight messages.
    pub fn active_count(&self) -> usize {
        self.conversations
            .values()
            .filter(|c| c.pending_count > 0)
            .count()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
