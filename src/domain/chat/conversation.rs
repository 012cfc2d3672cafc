//! Conversation entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, Timestamp, UserId};

/// A persisted conversation owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub user_id: UserId,
    pub title: String,
    pub created_at: Timestamp,
}

impl ConversationRecord {
    /// Creates a new conversation for the given user.
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            user_id,
            title: title.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Whether the given user owns this conversation.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
