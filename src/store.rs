//! Durable, ordered, append-only message persistence — the single source of
//! truth for every conversation.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryMessageStore;
pub use sqlite::SqliteMessageStore;

use crate::adapter::AgentKind;
use crate::content::ContentUnit;
use crate::error::Result;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "agent" => Ok(Sender::Agent),
            other => Err(format!(
                "invalid sender: '{other}', expected 'user' or 'agent'"
            )),
        }
    }
}

/// One logical chat owned by exactly one user and handled by exactly one
/// agent kind. The kind is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub agent_kind: AgentKind,
    pub created_at: DateTime<Utc>,
}

/// An atomic ledger entry. Ids are monotonic per conversation starting at 1;
/// once written, a message is immutable — corrections are new messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub sender: Sender,
    pub content: ContentUnit,
    pub created_at: DateTime<Utc>,
}

/// Append-only persistence contract.
///
/// `append` either durably stores the message with a freshly assigned id or
/// fails without consuming one — no partial success. Ids assigned to a
/// conversation are strictly increasing with no two callers ever receiving
/// the same id, even under concurrency.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_conversation(
        &self,
        owner_id: &str,
        agent_kind: AgentKind,
    ) -> Result<Conversation>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn append(
        &self,
        conversation_id: &str,
        sender: Sender,
        unit: ContentUnit,
    ) -> Result<Message>;

    /// All messages with id > `since_id`, ascending by id. `since_id = 0`
    /// returns the full transcript; a deleted or unknown conversation yields
    /// an empty list.
    async fn list(&self, conversation_id: &str, since_id: i64) -> Result<Vec<Message>>;

    /// Irreversible cascade: drops the conversation row and every message.
    /// Idempotent — deleting twice is not an error.
    async fn delete_all(&self, conversation_id: &str) -> Result<()>;
}
