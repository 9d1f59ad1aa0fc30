//! Core runtime: queues, routing, conversations, the agent pool, and the
//! orchestrator.

pub mod conversation;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod routing;

pub use conversation::{Conversation, ConversationTable};
pub use orchestrator::{Orchestrator, OutputCallback};
pub use pool::AgentPool;
pub use queue::{AgentQueue, InternalMessage, USER_SENDER};
pub use routing::{extract_mentions, parse_route_prefix, MentionMatch, RouteTarget};
