//! PostgreSQL implementation of ChatStore.
//!
//! The relay's read/append slice over the tables owned by the CRUD layer
//! (agents, models, conversations, messages). Schema management lives
//! with that layer; this adapter only queries.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::chat::{AgentProfile, ChatMessage, ConversationRecord, ModelProfile, Role};
use crate::domain::foundation::{
    AgentId, ConversationId, MessageId, ModelId, Timestamp, UserId,
};
use crate::ports::{ChatStore, ChatStoreError};

/// PostgreSQL implementation of ChatStore.
#[derive(Clone)]
pub struct PostgresChatStore {
    pool: PgPool,
}

impl PostgresChatStore {
    /// Creates a new PostgresChatStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> ChatStoreError {
    ChatStoreError::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl ChatStore for PostgresChatStore {
    async fn find_agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, ChatStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, instruction, team, is_system_agent
            FROM agents
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to fetch agent", e))?;

        row.map(|row| {
            Ok(AgentProfile {
                id: AgentId::from_uuid(
                    row.try_get("id").map_err(|e| storage_err("agent.id", e))?,
                ),
                name: row.try_get("name").map_err(|e| storage_err("agent.name", e))?,
                instruction: row
                    .try_get("instruction")
                    .map_err(|e| storage_err("agent.instruction", e))?,
                team: row
                    .try_get::<Option<Vec<String>>, _>("team")
                    .map_err(|e| storage_err("agent.team", e))?
                    .unwrap_or_default(),
                is_system_agent: row
                    .try_get("is_system_agent")
                    .map_err(|e| storage_err("agent.is_system_agent", e))?,
            })
        })
        .transpose()
    }

    async fn find_model(&self, id: &ModelId) -> Result<Option<ModelProfile>, ChatStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, provider
            FROM models
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to fetch model", e))?;

        row.map(|row| {
            Ok(ModelProfile {
                id: ModelId::from_uuid(
                    row.try_get("id").map_err(|e| storage_err("model.id", e))?,
                ),
                name: row.try_get("name").map_err(|e| storage_err("model.name", e))?,
                provider: row
                    .try_get("provider")
                    .map_err(|e| storage_err("model.provider", e))?,
            })
        })
        .transpose()
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, ChatStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to fetch conversation", e))?;

        row.map(|row| {
            Ok(ConversationRecord {
                id: ConversationId::from_uuid(
                    row.try_get("id").map_err(|e| storage_err("conversation.id", e))?,
                ),
                user_id: UserId::from_uuid(
                    row.try_get("user_id")
                        .map_err(|e| storage_err("conversation.user_id", e))?,
                ),
                title: row
                    .try_get("title")
                    .map_err(|e| storage_err("conversation.title", e))?,
                created_at: Timestamp::from_datetime(
                    row.try_get("created_at")
                        .map_err(|e| storage_err("conversation.created_at", e))?,
                ),
            })
        })
        .transpose()
    }

    async fn create_conversation(
        &self,
        user_id: &UserId,
        title: &str,
    ) -> Result<ConversationRecord, ChatStoreError> {
        let conversation = ConversationRecord::new(*user_id, title);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(conversation.id.as_uuid())
        .bind(conversation.user_id.as_uuid())
        .bind(&conversation.title)
        .bind(conversation.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to insert conversation", e))?;

        Ok(conversation)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), ChatStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, metadata, created_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM conversations WHERE id = $2)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.conversation_id.as_uuid())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.metadata)
        .bind(message.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to insert message", e))?;

        if result.rows_affected() == 0 {
            return Err(ChatStoreError::ConversationNotFound(message.conversation_id));
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatMessage>, ChatStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, metadata, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(conversation_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to list messages", e))?;

        rows.into_iter()
            .map(|row| {
                let role: String =
                    row.try_get("role").map_err(|e| storage_err("message.role", e))?;
                Ok(ChatMessage {
                    id: MessageId::from_uuid(
                        row.try_get("id").map_err(|e| storage_err("message.id", e))?,
                    ),
                    conversation_id: ConversationId::from_uuid(
                        row.try_get("conversation_id")
                            .map_err(|e| storage_err("message.conversation_id", e))?,
                    ),
                    role: role
                        .parse::<Role>()
                        .map_err(|e| storage_err("message.role", e))?,
                    content: row
                        .try_get("content")
                        .map_err(|e| storage_err("message.content", e))?,
                    metadata: row
                        .try_get("metadata")
                        .map_err(|e| storage_err("message.metadata", e))?,
                    created_at: Timestamp::from_datetime(
                        row.try_get("created_at")
                            .map_err(|e| storage_err("message.created_at", e))?,
                    ),
                })
            })
            .collect()
    }
}
