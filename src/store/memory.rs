//! In-memory message store for tests and embedded use.
//!
//! Same contract as the SQLite backend. A single mutex around the whole
//! state makes id assignment trivially atomic, which is exactly what the
//! concurrency property needs to be tested against.

use crate::adapter::AgentKind;
use crate::content::ContentUnit;
use crate::error::{LedgerError, Result};
use crate::store::{Conversation, Message, MessageStore, Sender};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessageStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
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

        let mut state = self.state.lock().await;
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        state.messages.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.conversations.get(conversation_id).cloned())
    }

    async fn append(
        &self,
        conversation_id: &str,
        sender: Sender,
        unit: ContentUnit,
    ) -> Result<Message> {
        let mut state = self.state.lock().await;
        if !state.conversations.contains_key(conversation_id) {
            return Err(LedgerError::ConversationNotFound(conversation_id.into()));
        }

        let messages = state.messages.entry(conversation_id.to_string()).or_default();
        let message = Message {
            id: messages.last().map(|m| m.id).unwrap_or(0) + 1,
            conversation_id: conversation_id.to_string(),
            sender,
            content: unit,
            created_at: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list(&self, conversation_id: &str, since_id: i64) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.id > since_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_all(&self, conversation_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.conversations.remove(conversation_id);
        state.messages.remove(conversation_id);
        Ok(())
    }
}
