//! Best-effort mirror of the transcript into an engine's native session
//! format.
//!
//! Some backing engines keep their own conversation memory (an LLM context
//! window, an engine-side session table). The bridge keeps that memory
//! eventually consistent with the message store via a per-conversation
//! watermark — the highest message id already reflected into the engine.
//! The store is always ground truth: bridge state can be dropped and rebuilt
//! at any time, and a mirroring failure never fails the turn that triggered
//! it. The missed messages are picked up on the next turn because the
//! watermark didn't advance.

use crate::content::ContentUnit;
use crate::error::Result;
use crate::store::{Message, MessageStore, Sender};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One transcript message flattened into the form engines consume.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEntry {
    /// Ledger message id this entry reflects.
    pub message_id: i64,
    pub role: Sender,
    pub text: String,
}

/// The engine-native session sink. Implemented per engine; the in-memory
/// implementation below serves tests and engines whose native store does not
/// survive restarts.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Append one entry to the engine's session for this conversation.
    async fn push(&self, conversation_id: &str, entry: EngineEntry) -> anyhow::Result<()>;

    /// Discard all engine-side session state for this conversation.
    async fn reset(&self, conversation_id: &str) -> anyhow::Result<()>;
}

/// Flatten a content unit to the plain-text line an engine context expects.
/// Structured payloads are summarized, not serialized — the engine needs
/// conversational context, the UI gets the real payload from the store.
fn engine_line(unit: &ContentUnit) -> String {
    match unit {
        ContentUnit::Text { text } => text.clone(),
        ContentUnit::Table { columns, rows } => {
            format!("[table: {} columns x {} rows]", columns.len(), rows.len())
        }
        ContentUnit::ChartSpec {
            chart_type, title, ..
        } => format!("[{chart_type} chart: {title}]"),
    }
}

/// Watermarked mirror from the message store into one engine session.
///
/// Scoped per adapter kind; watermarks are per conversation and live in
/// memory only, since everything here is rebuildable from the store.
#[derive(Clone)]
pub struct SessionBridge {
    store: Arc<dyn MessageStore>,
    session: Arc<dyn EngineSession>,
    watermarks: Arc<RwLock<HashMap<String, i64>>>,
}

impl SessionBridge {
    pub fn new(store: Arc<dyn MessageStore>, session: Arc<dyn EngineSession>) -> Self {
        Self {
            store,
            session,
            watermarks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Highest message id already reflected into the engine session.
    pub async fn watermark(&self, conversation_id: &str) -> i64 {
        self.watermarks
            .read()
            .await
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Mirror a completed turn into the engine session. Best-effort: errors
    /// are logged and the watermark stays put, so the next turn re-delivers
    /// whatever the engine missed. Never fails the caller.
    pub async fn mirror(&self, conversation_id: &str, turn: &[Message]) {
        let watermark = self.watermark(conversation_id).await;

        // If an earlier mirror failed, the watermark lags behind this turn's
        // first id. Pull the gap from the store — it is the ground truth —
        // rather than trusting only what the caller handed us.
        let first_id = match turn.iter().map(|m| m.id).min() {
            Some(id) => id,
            None => return,
        };
        let pending: Vec<Message> = if watermark < first_id - 1 {
            match self.store.list(conversation_id, watermark).await {
                Ok(messages) => messages,
                Err(error) => {
                    // Mirroring only the current turn would advance the
                    // watermark over the unread gap and lose it for good.
                    // Leave the watermark alone; the next turn retries the
                    // whole backlog.
                    tracing::warn!(
                        %error,
                        conversation_id,
                        "failed to read mirror backlog, deferring mirror to next turn"
                    );
                    return;
                }
            }
        } else {
            turn.iter().filter(|m| m.id > watermark).cloned().collect()
        };

        let mut advanced = watermark;
        for message in &pending {
            let entry = EngineEntry {
                message_id: message.id,
                role: message.sender,
                text: engine_line(&message.content),
            };
            match self.session.push(conversation_id, entry).await {
                Ok(()) => advanced = message.id,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        conversation_id,
                        message_id = message.id,
                        "session mirror failed, will retry on next turn"
                    );
                    break;
                }
            }
        }

        if advanced > watermark {
            self.watermarks
                .write()
                .await
                .insert(conversation_id.to_string(), advanced);
        }
    }

    /// Discard the engine session and rebuild it from the store — the
    /// self-healing path when engine state diverged or didn't survive a
    /// restart. The watermark ends at the transcript head.
    pub async fn rebuild(&self, conversation_id: &str) -> Result<()> {
        if let Err(error) = self.session.reset(conversation_id).await {
            tracing::warn!(%error, conversation_id, "engine session reset failed during rebuild");
        }
        self.watermarks.write().await.remove(conversation_id);

        let messages = self.store.list(conversation_id, 0).await?;
        tracing::info!(
            conversation_id,
            message_count = messages.len(),
            "rebuilding engine session from ledger"
        );
        self.mirror(conversation_id, &messages).await;
        Ok(())
    }

    /// Drop bridge and engine state for a deleted conversation.
    pub async fn teardown(&self, conversation_id: &str) {
        if let Err(error) = self.session.reset(conversation_id).await {
            tracing::warn!(%error, conversation_id, "engine session reset failed during teardown");
        }
        self.watermarks.write().await.remove(conversation_id);
    }
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge").finish_non_exhaustive()
    }
}

/// In-memory engine session: a plain per-conversation entry list.
#[derive(Clone, Default)]
pub struct MemoryEngineSession {
    entries: Arc<RwLock<HashMap<String, Vec<EngineEntry>>>>,
}

impl MemoryEngineSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self, conversation_id: &str) -> Vec<EngineEntry> {
        self.entries
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EngineSession for MemoryEngineSession {
    async fn push(&self, conversation_id: &str, entry: EngineEntry) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn reset(&self, conversation_id: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(conversation_id);
        Ok(())
    }
}
