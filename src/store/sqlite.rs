//! SQLite-backed message store (the authoritative backend).

use crate::adapter::AgentKind;
use crate::content::{self, ContentUnit};
use crate::error::{LedgerError, Result};
use crate::store::{Conversation, Message, MessageStore, Sender};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Message persistence backed by the ledger's SQLite database.
///
/// Id assignment happens inside the insert statement itself
/// (`COALESCE(MAX(id), 0) + 1` in a single `INSERT ... SELECT`), so two
/// callers racing on the same conversation can never both observe the same
/// next id — SQLite serializes the statement, and the composite primary key
/// rejects any duplicate that slips past.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    owner_id: String,
    agent_kind: String,
    created_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        let agent_kind = AgentKind::from_str(&self.agent_kind)
            .map_err(LedgerError::MalformedContent)?;
        Ok(Conversation {
            id: self.id,
            owner_id: self.owner_id,
            agent_kind,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: String,
    sender: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let sender = Sender::from_str(&self.sender).map_err(LedgerError::MalformedContent)?;
        let content = content::decode(&self.content)?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender,
            content,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create_conversation(
        &self,
        owner_id: &str,
        agent_kind: AgentKind,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            agent_kind,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, agent_kind, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.owner_id)
        .bind(conversation.agent_kind.as_str())
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await
        .context("failed to create conversation")
        .map_err(LedgerError::storage)?;

        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, owner_id, agent_kind, created_at \
             FROM conversations \
             WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch conversation")
        .map_err(LedgerError::storage)?;

        row.map(ConversationRow::into_conversation).transpose()
    }

    async fn append(
        &self,
        conversation_id: &str,
        sender: Sender,
        unit: ContentUnit,
    ) -> Result<Message> {
        // Check and insert share a transaction so a concurrent cascade
        // delete cannot slip between them; the messages foreign key rejects
        // whatever would still race past.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin append transaction")
            .map_err(LedgerError::storage)?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to check conversation before append")
            .map_err(LedgerError::storage)?;
        if exists.is_none() {
            return Err(LedgerError::ConversationNotFound(conversation_id.into()));
        }

        let encoded = content::encode(&unit);
        let created_at = Utc::now();

        // Single statement: id assignment and insert are atomic together.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (conversation_id, id, sender, content, created_at) \
             SELECT ?1, COALESCE((SELECT MAX(id) FROM messages WHERE conversation_id = ?1), 0) + 1, ?2, ?3, ?4 \
             RETURNING id",
        )
        .bind(conversation_id)
        .bind(sender.as_str())
        .bind(&encoded)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .context("failed to append message")
        .map_err(LedgerError::storage)?;

        tx.commit()
            .await
            .context("failed to commit append")
            .map_err(LedgerError::storage)?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender,
            content: unit,
            created_at,
        })
    }

    async fn list(&self, conversation_id: &str, since_id: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, sender, content, created_at \
             FROM messages \
             WHERE conversation_id = ? AND id > ? \
             ORDER BY id ASC",
        )
        .bind(conversation_id)
        .bind(since_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list messages")
        .map_err(LedgerError::storage)?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn delete_all(&self, conversation_id: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin delete transaction")
            .map_err(LedgerError::storage)?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("failed to delete messages")
            .map_err(LedgerError::storage)?;

        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .context("failed to delete conversation")
            .map_err(LedgerError::storage)?;

        tx.commit()
            .await
            .context("failed to commit delete")
            .map_err(LedgerError::storage)?;

        Ok(())
    }
}
