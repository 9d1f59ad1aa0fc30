//! In-memory per-agent work queues for agentmesh.
//!
//! Each configured agent gets one FIFO queue. Messages are owned by the
//! queue until dequeued, then by the processing worker. Delivery is
//! at-most-once, in-process, best-effort.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Reserved sender id for externally-originated messages.
pub const USER_SENDER: &str = "__user__";

/// Unit of work on an agent queue. Immutable once created.
#[derive(Debug, Clone)]
pub struct InternalMessage {
    /// Monotonically increasing, process-unique id.
    pub id: u64,

    /// Sending agent, or [`USER_SENDER`] for external submissions.
    pub sender_agent_id: String,

    /// Agent this message is queued for.
    pub target_agent_id: String,

    /// Message content.
    pub content: String,

    /// Conversation this message belongs to.
    pub conversation_id: String,

    /// Unix timestamp (milliseconds).
    pub timestamp: i64,

    /// True if produced by mention dispatch rather than external submission.
    pub is_mention: bool,
}

impl InternalMessage {
    pub fn new(
        id: u64,
        sender_agent_id: &str,
        target_agent_id: &str,
        content: &str,
        conversation_id: &str,
        is_mention: bool,
    ) -> Self {
        Self {
            id,
            sender_agent_id: sender_agent_id.to_string(),
            target_agent_id: target_agent_id.to_string(),
            content: content.to_string(),
            conversation_id: conversation_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_mention,
        }
    }
}

/// FIFO queue for one agent, with a wakeup primitive for its worker.
#[derive(Default)]
pub struct AgentQueue {
    messages: Mutex<VecDeque<InternalMessage>>,
    notify: Notify,
}

impl AgentQueue {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a message and wake the worker. Never blocks beyond the
    /// queue lock.
    pub fn push(&self, msg: InternalMessage) {
        {
            let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
            messages.push_back(msg);
        }
        self.notify.notify_one();
    }

    /// Dequeue the oldest message, if any.
    pub fn pop(&self) -> Option<InternalMessage> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake the worker without enqueueing (used for shutdown).
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Wait until the queue is (probably) non-empty or the timeout elapses.
    ///
    /// The bounded wait is load-bearing: the running flag and the queue are
    /// not updated atomically together, so a shutdown signalled between the
    /// worker's emptiness check and its wait is still observed within one
    /// polling interval.
    pub async fn wait(&self, timeout: std::time::Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}
