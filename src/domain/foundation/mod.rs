//! Foundation value objects shared across the domain.

mod ids;
mod timestamp;

pub use ids::{AgentId, ConversationId, MessageId, ModelId, RelaySessionId, UserId};
pub use timestamp::Timestamp;
