//! Orchestrator: per-agent worker loops and mention-based message routing.
//!
//! One worker task per configured agent drains that agent's FIFO queue.
//! External input enters through [`Orchestrator::submit`]; each successful
//! engine response is scanned for `[@target: message]` mentions, which are
//! re-dispatched to the mentioned agents (teams resolve to their leader)
//! until the cascade dies out or the conversation's message budget is
//! exhausted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;

use crate::config::{default_agent_id, Settings};
use crate::core::conversation::{Conversation, ConversationTable};
use crate::core::pool::AgentPool;
use crate::core::queue::{AgentQueue, InternalMessage, USER_SENDER};
use crate::core::routing::{extract_mentions, parse_route_prefix};
use crate::engine::RunOptions;
use crate::error::Result;

/// Sink for agent output: `(agent_id, text, is_error)`.
///
/// Worker loops invoke this concurrently, so implementations must be
/// internally synchronized (e.g. serialize writes to a shared console).
pub type OutputCallback = Arc<dyn Fn(&str, &str, bool) + Send + Sync>;

/// Bound on the worker wait so a shutdown signalled between the emptiness
/// check and the wait is observed within one interval.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cheap cloneable handle to the running orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Arc<AgentPool>,
    settings: Arc<Settings>,

    // Populated before any worker starts, cleared after all have joined.
    queues: RwLock<HashMap<String, Arc<AgentQueue>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,

    conversations: Mutex<ConversationTable>,
    output: Mutex<Option<OutputCallback>>,

    running: AtomicBool,
    next_message_id: AtomicU64,
    next_conversation: AtomicU64,
}

impl Orchestrator {
    pub fn new(pool: Arc<AgentPool>, settings: Arc<Settings>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                settings,
                queues: RwLock::new(HashMap::new()),
                workers: Mutex::new(Vec::new()),
                conversations: Mutex::new(ConversationTable::new()),
                output: Mutex::new(None),
                running: AtomicBool::new(false),
                next_message_id: AtomicU64::new(0),
                next_conversation: AtomicU64::new(0),
            }),
        }
    }

    /// Start one queue and one worker per agent known to the pool.
    /// No-op if already running.
    pub fn start(&self, output: OutputCallback) {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Orchestrator already running, ignoring start()");
            return;
        }

        *lock(&inner.output) = Some(output);

        let agent_ids = inner.pool.agent_ids();
        let mut queues = write(&inner.queues);
        let mut workers = lock(&inner.workers);

        for agent_id in agent_ids {
            let queue = Arc::new(AgentQueue::new());
            queues.insert(agent_id.clone(), queue.clone());

            let worker_inner = inner.clone();
            workers.push(tokio::spawn(async move {
                worker_inner.agent_loop(agent_id, queue).await;
            }));
        }

        tracing::info!("Orchestrator started with {} agent workers", workers.len());
    }

    /// Stop all workers: flip the running flag, wake every waiter, join
    /// every worker, then tear the queues down. Safe when not running.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for queue in read(&inner.queues).values() {
            queue.wake();
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&inner.workers));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker task ended abnormally: {}", e);
            }
        }

        write(&inner.queues).clear();
        lock(&inner.output).take();

        tracing::info!("Orchestrator stopped");
    }

    /// Fire-and-forget entry point for inbound work.
    ///
    /// Routing: a leading `@<agent-or-team-id> ` prefix routes explicitly
    /// (teams resolve to their leader); otherwise the default agent receives
    /// the full input. Routing failures are logged, never returned, since
    /// there is no reply channel for the submitter.
    pub fn submit(&self, input: &str, channel: &str, sender: &str) {
        let inner = &self.inner;
        let input = input.trim();
        if input.is_empty() {
            return;
        }

        let (target, content) = match parse_route_prefix(input) {
            Some(route) => match inner.resolve_target(&route.target_id) {
                Some(agent_id) => (agent_id, route.message),
                None => {
                    tracing::warn!(
                        "Unknown route target '@{}', dropping message from {}",
                        route.target_id,
                        sender
                    );
                    return;
                }
            },
            None => match default_agent_id(&inner.settings) {
                Some(agent_id) => (agent_id, input.to_string()),
                None => {
                    tracing::warn!("No default agent configured, dropping message from {}", sender);
                    return;
                }
            },
        };

        let conversation_id = format!(
            "conv-{}",
            inner.next_conversation.fetch_add(1, Ordering::SeqCst) + 1
        );
        lock(&inner.conversations).insert(Conversation::new(
            &conversation_id,
            &target,
            channel,
            sender,
        ));

        let msg = InternalMessage::new(
            inner.next_message_id(),
            USER_SENDER,
            &target,
            &content,
            &conversation_id,
            false,
        );

        tracing::debug!(
            "Submitted message {} to '@{}' ({}, conversation {})",
            msg.id,
            target,
            channel,
            conversation_id
        );
        inner.enqueue(msg);
    }

    /// Line-oriented REPL over the orchestrator: `start()`, one `submit`
    /// per non-empty line, `stop()` on `exit`/`quit` or EOF.
    pub async fn run_interactive(&self) -> Result<()> {
        let output: OutputCallback = Arc::new(|agent_id, text, is_error| {
            if is_error {
                eprintln!("[@{}] error: {}", agent_id, text);
            } else {
                println!("[@{}] {}", agent_id, text);
            }
        });
        self.start(output);

        println!("agentmesh interactive mode. 'exit' or 'quit' to leave.");
        println!("Route with '@agent message' or '@team message'; plain input goes to the default agent.");

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }
            self.submit(line, "cli", "user");
        }

        self.stop().await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn list_agent_ids(&self) -> Vec<String> {
        self.inner.pool.agent_ids()
    }

    pub fn list_team_ids(&self) -> Vec<String> {
        self.inner.pool.team_ids()
    }

    /// Conversations with in-flight messages.
    pub fn active_conversation_count(&self) -> usize {
        lock(&self.inner.conversations).active_count()
    }
}

impl Inner {
    fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolve an agent-or-team id to a runnable agent id.
    fn resolve_target(&self, target_id: &str) -> Option<String> {
        if self.pool.has_team(target_id) {
            let leader = self.pool.team_leader(target_id);
            if leader.is_empty() || !self.pool.has_agent(&leader) {
                return None;
            }
            return Some(leader);
        }
        if self.pool.has_agent(target_id) {
            return Some(target_id.to_string());
        }
        None
    }

    fn enqueue(&self, msg: InternalMessage) {
        let queues = read(&self.queues);
        match queues.get(&msg.target_agent_id) {
            Some(queue) => queue.push(msg),
            None => {
                tracing::warn!(
                    "Agent '{}' has no running queue, dropping message {}",
                    msg.target_agent_id,
                    msg.id
                );
            }
        }
    }

    /// Worker loop for one agent: Idle (bounded wait) -> Processing -> Idle.
    /// Drains remaining messages before exiting on shutdown.
    async fn agent_loop(self: Arc<Self>, agent_id: String, queue: Arc<AgentQueue>) {
        tracing::debug!("Worker started for agent '{}'", agent_id);

        loop {
            if let Some(msg) = queue.pop() {
                self.process_message(&agent_id, msg).await;
                continue;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            queue.wait(POLL_INTERVAL).await;
        }

        tracing::debug!("Worker stopped for agent '{}'", agent_id);
    }

    async fn process_message(&self, agent_id: &str, msg: InternalMessage) {
        // Loop protection: the single mechanism preventing runaway
        // agent-to-agent cascades.
        let budget = self.settings.routing.max_internal_messages;
        {
            let mut conversations = lock(&self.conversations);
            if let Some(conversation) = conversations.get_mut(&msg.conversation_id) {
                if conversation.budget_exhausted(budget) {
                    tracing::warn!(
                        "Conversation {} exceeded its message budget ({}), dropping message {} for '{}'",
                        msg.conversation_id,
                        budget,
                        msg.id,
                        agent_id
                    );
                    return;
                }
                conversation.total_messages += 1;
            }
        }

        let engine = match self.pool.get_or_create(agent_id).await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!("Agent '{}': engine unavailable: {}", agent_id, e);
                return;
            }
        };

        let options = self.run_options_for(agent_id);

        tracing::debug!(
            "Agent '{}' processing message {} (conversation {})",
            agent_id,
            msg.id,
            msg.conversation_id
        );

        let response = match engine.run(&msg.content, &options).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    "Agent '{}': engine run failed for message {}: {}",
                    agent_id,
                    msg.id,
                    e
                );
                return;
            }
        };

        let callback = lock(&self.output).clone();
        if let Some(callback) = callback {
            callback(agent_id, &response, false);
        }

        {
            let mut conversations = lock(&self.conversations);
            if let Some(conversation) = conversations.get_mut(&msg.conversation_id) {
                if conversation.pending_count > 0 {
                    conversation.pending_count -= 1;
                }
            }
        }

        self.dispatch_mentions(agent_id, &msg.conversation_id, &response);
    }

    /// Scan a response for mention tags and enqueue one follow-up message
    /// per mention, resolving team names to their leader.
    fn dispatch_mentions(&self, sender_agent_id: &str, conversation_id: &str, response: &str) {
        for mention in extract_mentions(response) {
            let target = match self.resolve_target(&mention.target_agent_id) {
                Some(agent_id) => agent_id,
                None => {
                    tracing::warn!(
                        "Mention target '@{}' from '{}' is not a known agent, skipping",
                        mention.target_agent_id,
                        sender_agent_id
                    );
                    continue;
                }
            };

            let queues = read(&self.queues);
            let queue = match queues.get(&target) {
                Some(queue) => queue.clone(),
                None => {
                    tracing::warn!(
                        "Mention target '@{}' has no running queue, skipping",
                        target
                    );
                    continue;
                }
            };
            drop(queues);

            {
                let mut conversations = lock(&self.conversations);
                if let Some(conversation) = conversations.get_mut(conversation_id) {
                    conversation.pending_count += 1;
                }
            }

            let content = format!("[from @{}] {}", sender_agent_id, mention.message);
            let msg = InternalMessage::new(
                self.next_message_id(),
                sender_agent_id,
                &target,
                &content,
                conversation_id,
                true,
            );

            tracing::debug!(
                "Dispatching mention from '{}' to '{}' (message {}, conversation {})",
                sender_agent_id,
                target,
                msg.id,
                conversation_id
            );
            queue.push(msg);
        }
    }

    fn run_options_for(&self, agent_id: &str) -> RunOptions {
        let config = self.pool.agent_config(agent_id);
        RunOptions {
            agent_id: agent_id.to_string(),
            model: config.and_then(|c| c.model.clone()),
            temperature: config.and_then(|c| c.temperature),
        }
    }
}

// Lock helpers: a poisoned lock only means another worker panicked mid-hold;
// the protected data is still structurally valid for this design.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::config::{AgentConfig, TeamConfig};
    use crate::engine::{Engine, EngineFactory};

    type ReplyFn = Box<dyn Fn(&str) -> String + Send + Sync>;

    struct ScriptedEngine {
        reply: ReplyFn,
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        async fn run(&self, content: &str, _options: &RunOptions) -> Result<String> {
            Ok((self.reply)(content))
        }
    }

    struct ScriptedFactory {
        engines: StdMutex<HashMap<String, Arc<dyn Engine>>>,
    }

    impl ScriptedFactory {
        fn new() -> Self {
            Self {
                engines: StdMutex::new(HashMap::new()),
            }
        }

        fn script<F>(self, agent_id: &str, reply: F) -> Self
        where
            F: Fn(&str) -> String + Send + Sync + 'static,
        {
            self.engines.lock().unwrap().insert(
                agent_id.to_string(),
                Arc::new(ScriptedEngine {
                    reply: Box::new(reply),
                }),
            );
            self
        }
    }

    #[async_trait]
    impl EngineFactory for ScriptedFactory {
        async fn build(
            &self,
            agent_id: &str,
            _config: &AgentConfig,
            _settings: &Settings,
        ) -> Result<Arc<dyn Engine>> {
            self.engines
                .lock()
                .unwrap()
                .get(agent_id)
                .cloned()
                .ok_or_else(|| crate::error::Error::Engine(format!("unscripted agent: {}", agent_id)))
        }
    }

    fn test_settings(max_internal_messages: usize) -> Arc<Settings> {
        let mut settings = Settings::default();
        for id in ["coder", "reviewer"] {
            settings.agents.insert(id.to_string(), AgentConfig::default());
        }
        settings.teams.insert(
            "dev".to_string(),
            TeamConfig {
                name: "Dev Team".to_string(),
                agents: vec!["coder".to_string(), "reviewer".to_string()],
                leader_agent: Some("coder".to_string()),
                description: None,
            },
        );
        settings.routing.default_agent = Some("coder".to_string());
        settings.routing.max_internal_messages = max_internal_messages;
        Arc::new(settings)
    }

    fn orchestrator_with(factory: ScriptedFactory, max: usize) -> Orchestrator {
        let settings = test_settings(max);
        let pool = Arc::new(AgentPool::with_factory(settings.clone(), Box::new(factory)));
        Orchestrator::new(pool, settings)
    }

    type Outputs = Arc<StdMutex<Vec<(String, String)>>>;

    fn capture() -> (OutputCallback, Outputs) {
        let outputs: Outputs = Arc::new(StdMutex::new(Vec::new()));
        let sink = outputs.clone();
        let callback: OutputCallback = Arc::new(move |agent_id, text, _is_error| {
            sink.lock().unwrap().push((agent_id.to_string(), text.to_string()));
        });
        (callback, outputs)
    }

    async fn wait_for_outputs(outputs: &Outputs, count: usize) {
        for _ in 0..300 {
            if outputs.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {} outputs, have {}",
            count,
            outputs.lock().unwrap().len()
        );
    }

    /// Grace period for asserting that nothing further arrives.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_per_agent() {
        let factory = ScriptedFactory::new()
            .script("coder", |content| format!("echo: {}", content))
            .script("reviewer", |_| "ok".to_string());
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("one", "cli", "user");
        orch.submit("two", "cli", "user");
        orch.submit("three", "cli", "user");

        wait_for_outputs(&outputs, 3).await;
        let collected = outputs.lock().unwrap().clone();
        assert_eq!(collected[0], ("coder".to_string(), "echo: one".to_string()));
        assert_eq!(collected[1], ("coder".to_string(), "echo: two".to_string()));
        assert_eq!(collected[2], ("coder".to_string(), "echo: three".to_string()));

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_loop_protection_caps_cascade() {
        // Two agents that always mention each other would cascade forever
        // without the budget.
        let factory = ScriptedFactory::new()
            .script("coder", |_| "[@reviewer: ping]".to_string())
            .script("reviewer", |_| "[@coder: pong]".to_string());
        let orch = orchestrator_with(factory, 2);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("start", "cli", "user");

        wait_for_outputs(&outputs, 2).await;
        settle().await;
        assert_eq!(outputs.lock().unwrap().len(), 2);

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_team_routes_to_leader() {
        let factory = ScriptedFactory::new()
            .script("coder", |content| format!("leader got: {}", content))
            .script("reviewer", |content| format!("member got: {}", content));
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("@dev ship it", "cli", "user");

        wait_for_outputs(&outputs, 1).await;
        settle().await;

        let collected = outputs.lock().unwrap().clone();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].0, "coder");
        assert_eq!(collected[0].1, "leader got: ship it");

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mention_dispatch_prefixes_sender() {
        let factory = ScriptedFactory::new()
            .script("coder", |content| {
                if content.starts_with("[from @") {
                    "noted".to_string()
                } else {
                    "[@reviewer: check this]".to_string()
                }
            })
            .script("reviewer", |content| format!("reviewing: {}", content));
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("@coder do the thing", "cli", "user");

        wait_for_outputs(&outputs, 2).await;
        let collected = outputs.lock().unwrap().clone();
        assert_eq!(collected[0].0, "coder");
        assert_eq!(collected[1].0, "reviewer");
        assert_eq!(collected[1].1, "reviewing: [from @coder] check this");

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unknown_target_is_dropped() {
        let factory = ScriptedFactory::new()
            .script("coder", |_| "ok".to_string())
            .script("reviewer", |_| "ok".to_string());
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("@ghost do something", "cli", "user");

        settle().await;
        assert!(outputs.lock().unwrap().is_empty());
        assert_eq!(orch.active_conversation_count(), 0);

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unknown_mention_is_skipped() {
        let factory = ScriptedFactory::new()
            .script("coder", |_| "[@ghost: boo] [@reviewer: real work]".to_string())
            .script("reviewer", |content| format!("got: {}", content));
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);

        orch.submit("@coder go", "cli", "user");

        wait_for_outputs(&outputs, 2).await;
        settle().await;

        let collected = outputs.lock().unwrap().clone();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].1, "got: [from @coder] real work");

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_drains_and_restart_works() {
        let factory = ScriptedFactory::new()
            .script("coder", |content| format!("echo: {}", content))
            .script("reviewer", |_| "ok".to_string());
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback);
        assert!(orch.is_running());

        orch.submit("first run", "cli", "user");
        wait_for_outputs(&outputs, 1).await;

        orch.stop().await;
        assert!(!orch.is_running());

        // Restart processes normally.
        let (callback, outputs2) = capture();
        orch.start(callback);
        orch.submit("second run", "cli", "user");
        wait_for_outputs(&outputs2, 1).await;
        assert_eq!(outputs2.lock().unwrap()[0].1, "echo: second run");

        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_double_start_is_idempotent() {
        let factory = ScriptedFactory::new()
            .script("coder", |content| format!("echo: {}", content))
            .script("reviewer", |_| "ok".to_string());
        let orch = orchestrator_with(factory, 16);

        let (callback, outputs) = capture();
        orch.start(callback.clone());
        orch.start(callback);

        orch.submit("once", "cli", "user");
        wait_for_outputs(&outputs, 1).await;
        settle().await;

        // One worker set, so exactly one processing of the message.
        assert_eq!(outputs.lock().unwrap().len(), 1);

        orch.stop().await;
        // stop() when already stopped is a no-op.
        orch.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_introspection() {
        let factory = ScriptedFactory::new()
            .script("coder", |_| "ok".to_string())
            .script("reviewer", |_| "ok".to_string());
        let orch = orchestrator_with(factory, 16);

        assert_eq!(orch.list_agent_ids(), vec!["coder", "reviewer"]);
        assert_eq!(orch.list_team_ids(), vec!["dev"]);
        assert!(!orch.is_running());
        assert_eq!(orch.active_conversation_count(), 0);

        let (callback, outputs) = capture();
        orch.start(callback);
        orch.submit("hello", "cli", "user");
        wait_for_outputs(&outputs, 1).await;
        settle().await;

        // Conversation fully processed: nothing left in flight.
        assert_eq!(orch.active_conversation_count(), 0);

        orch.stop().await;
    }
}
