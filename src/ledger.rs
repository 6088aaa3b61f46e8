//! The conversation ledger: the orchestrator that owns the transcript.
//!
//! Every turn runs the same state machine: `Received` → `Dispatched` →
//! `UnitsProduced` → `Persisted` → `MirrorUpdated` (only for adapters that
//! statically declared mirroring) → `Complete`. A failed dispatch takes the
//! failure path — a synthetic text unit is persisted in place of the
//! adapter's output, so the transcript is a complete record of what was
//! attempted and no turn is ever left half-written.
//!
//! Turns on a single conversation are serialized: a second caller either
//! fails fast with `ConversationBusy` or queues behind the in-flight turn,
//! per config. Turns on different conversations run in parallel.

use crate::adapter::{AdapterRegistry, AgentAdapter, AgentKind, HistoryView};
use crate::bridge::{EngineSession, SessionBridge};
use crate::config::{BusyPolicy, LedgerConfig};
use crate::content::ContentUnit;
use crate::error::{LedgerError, Result};
use crate::render::{self, DisplayForm};
use crate::store::{Conversation, Message, MessageStore, Sender};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Phases of an in-flight turn, logged for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Received,
    Dispatched,
    UnitsProduced,
    Failed,
    Persisted,
    MirrorUpdated,
    Complete,
}

impl TurnPhase {
    fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Received => "received",
            TurnPhase::Dispatched => "dispatched",
            TurnPhase::UnitsProduced => "units_produced",
            TurnPhase::Failed => "failed",
            TurnPhase::Persisted => "persisted",
            TurnPhase::MirrorUpdated => "mirror_updated",
            TurnPhase::Complete => "complete",
        }
    }
}

pub struct ConversationLedger {
    store: Arc<dyn MessageStore>,
    adapters: AdapterRegistry,
    /// One bridge per adapter kind that declared mirroring. Presence here is
    /// enforced at registration, so the mirror step depends only on the
    /// adapter's static declaration — never on which branch of the adapter
    /// happened to run.
    bridges: HashMap<AgentKind, SessionBridge>,
    config: LedgerConfig,
    turn_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLedger {
    pub fn new(store: Arc<dyn MessageStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            adapters: AdapterRegistry::new(),
            bridges: HashMap::new(),
            config,
            turn_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register an adapter at process start. Adapters that declare session
    /// mirroring must come with the engine session to mirror into — refusing
    /// a mirroring adapter without a sink is what makes the per-turn mirror
    /// step unconditional.
    pub fn register_adapter(
        &mut self,
        adapter: Arc<dyn AgentAdapter>,
        session: Option<Arc<dyn EngineSession>>,
    ) -> Result<()> {
        let kind = adapter.kind();
        match (adapter.wants_session_mirroring(), session) {
            (true, Some(session)) => {
                self.bridges
                    .insert(kind, SessionBridge::new(self.store.clone(), session));
            }
            (true, None) => {
                return Err(LedgerError::Config(format!(
                    "adapter '{kind}' declares session mirroring but no engine session was provided"
                )));
            }
            (false, Some(_)) => {
                return Err(LedgerError::Config(format!(
                    "adapter '{kind}' does not mirror; remove its engine session"
                )));
            }
            (false, None) => {}
        }
        self.adapters.register(adapter);
        Ok(())
    }

    /// Create a conversation bound to an agent kind. Fails if no adapter is
    /// registered for that kind — a conversation nothing can answer is a
    /// wiring error worth catching at creation.
    pub async fn create_conversation(
        &self,
        owner_id: &str,
        agent_kind: AgentKind,
    ) -> Result<Conversation> {
        if self.adapters.get(agent_kind).is_none() {
            return Err(LedgerError::AdapterUnavailable(agent_kind.to_string()));
        }
        self.store.create_conversation(owner_id, agent_kind).await
    }

    /// Submit a user message and run the full turn: persist the user
    /// message, dispatch to the conversation's adapter, persist every
    /// produced unit in order, then mirror the completed turn if the adapter
    /// declared mirroring. Returns the whole turn — user message first —
    /// once everything is durably stored.
    #[tracing::instrument(skip(self, text), fields(conversation_id = %conversation_id))]
    pub async fn post_user_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Vec<Message>> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| LedgerError::ConversationNotFound(conversation_id.into()))?;

        let adapter = self
            .adapters
            .get(conversation.agent_kind)
            .ok_or_else(|| {
                LedgerError::AdapterUnavailable(conversation.agent_kind.to_string())
            })?;

        // Serialize the whole turn per conversation. Interleaved turns would
        // interleave message ids, which breaks strict ordering.
        let lock = self.turn_lock(conversation_id).await;
        let _guard = match self.config.busy_policy {
            BusyPolicy::Reject => lock.try_lock_owned().map_err(|_| {
                LedgerError::ConversationBusy(conversation_id.to_string())
            })?,
            BusyPolicy::Queue => lock.lock_owned().await,
        };

        tracing::debug!(phase = TurnPhase::Received.as_str(), "turn started");

        // A storage failure here aborts before dispatch: no inference is
        // spent on a message that was never saved.
        let user_message = self
            .store
            .append(conversation_id, Sender::User, ContentUnit::text(text))
            .await?;

        let context = self.history_view(conversation_id, user_message.id).await?;

        tracing::debug!(
            phase = TurnPhase::Dispatched.as_str(),
            agent_kind = %conversation.agent_kind,
            context_len = context.len(),
            "dispatching to adapter"
        );

        let units = match adapter.handle(conversation_id, text, &context).await {
            Ok(units) if !units.is_empty() => {
                tracing::debug!(
                    phase = TurnPhase::UnitsProduced.as_str(),
                    unit_count = units.len(),
                    "adapter produced units"
                );
                units
            }
            Ok(_) => {
                tracing::warn!(
                    phase = TurnPhase::Failed.as_str(),
                    agent_kind = %conversation.agent_kind,
                    "adapter returned no content units"
                );
                vec![ContentUnit::text(self.config.error_unit_text.clone())]
            }
            Err(error) => {
                tracing::warn!(
                    phase = TurnPhase::Failed.as_str(),
                    %error,
                    agent_kind = %conversation.agent_kind,
                    "adapter failed, persisting synthetic error unit"
                );
                vec![ContentUnit::text(self.config.error_unit_text.clone())]
            }
        };

        let mut turn = vec![user_message];
        turn.extend(self.post_agent_units(conversation_id, units).await?);

        tracing::debug!(
            phase = TurnPhase::Persisted.as_str(),
            message_count = turn.len(),
            "turn persisted"
        );

        // The mirror step is keyed on the adapter's static declaration
        // alone. Skipped entirely — not no-op'd — when mirroring is off.
        if adapter.wants_session_mirroring() {
            if let Some(bridge) = self.bridges.get(&conversation.agent_kind) {
                bridge.mirror(conversation_id, &turn).await;
                tracing::debug!(phase = TurnPhase::MirrorUpdated.as_str(), "mirror updated");
            }
        }

        tracing::debug!(phase = TurnPhase::Complete.as_str(), "turn complete");
        Ok(turn)
    }

    /// Persist an ordered sequence of agent units, one message each.
    /// Internal step of `post_user_message`, factored out so adapters that
    /// stream still append each completed unit as a whole — partial units
    /// are a transport concern and never reach the store.
    async fn post_agent_units(
        &self,
        conversation_id: &str,
        units: Vec<ContentUnit>,
    ) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(units.len());
        for unit in units {
            messages.push(self.append_with_retry(conversation_id, unit).await?);
        }
        Ok(messages)
    }

    /// Append one agent unit, retrying a bounded number of times on storage
    /// failure. The units were already produced — retrying is cheaper than
    /// discarding inference output, but the budget is finite and the caller
    /// hears about exhaustion.
    async fn append_with_retry(
        &self,
        conversation_id: &str,
        unit: ContentUnit,
    ) -> Result<Message> {
        let mut attempt = 0u32;
        loop {
            match self
                .store
                .append(conversation_id, Sender::Agent, unit.clone())
                .await
            {
                Ok(message) => return Ok(message),
                Err(LedgerError::StorageUnavailable(error))
                    if attempt < self.config.storage_retry_limit =>
                {
                    attempt += 1;
                    tracing::warn!(
                        %error,
                        attempt,
                        conversation_id,
                        "agent unit append failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Full history as (message, display form) pairs. Deterministic: history
    /// is only ever replayed from the store through the same projector used
    /// live — no agent is re-run, so calling this twice without intervening
    /// writes yields identical output. A deleted or unknown conversation
    /// yields an empty list.
    pub async fn get_history(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<(Message, DisplayForm)>> {
        let messages = self.store.list(conversation_id, 0).await?;
        Ok(messages
            .into_iter()
            .map(|message| {
                let display = render::project(&message.content);
                (message, display)
            })
            .collect())
    }

    /// Delete a conversation: cascade the store and tear down any bridge
    /// state. Idempotent.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.store.delete_all(conversation_id).await?;
        for bridge in self.bridges.values() {
            bridge.teardown(conversation_id).await;
        }
        self.turn_locks.lock().await.remove(conversation_id);
        tracing::info!(conversation_id, "conversation deleted");
        Ok(())
    }

    /// Rebuild the engine session for a conversation from the transcript —
    /// the self-healing path after detected divergence or engine restart.
    /// A no-op for conversations whose adapter doesn't mirror.
    pub async fn rebuild_session(&self, conversation_id: &str) -> Result<()> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| LedgerError::ConversationNotFound(conversation_id.into()))?;

        match self.bridges.get(&conversation.agent_kind) {
            Some(bridge) => bridge.rebuild(conversation_id).await,
            None => Ok(()),
        }
    }

    /// Mirror watermark for a conversation, if its adapter mirrors. For
    /// observability and tests.
    pub async fn session_watermark(&self, conversation_id: &str) -> Result<Option<i64>> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| LedgerError::ConversationNotFound(conversation_id.into()))?;

        match self.bridges.get(&conversation.agent_kind) {
            Some(bridge) => Ok(Some(bridge.watermark(conversation_id).await)),
            None => Ok(None),
        }
    }

    /// The transcript the adapter sees: everything before the current user
    /// message, bounded by the configured history window.
    async fn history_view(&self, conversation_id: &str, before_id: i64) -> Result<HistoryView> {
        let mut messages = self.store.list(conversation_id, 0).await?;
        messages.retain(|m| m.id < before_id);
        let (messages, truncated) = self.config.history_window.apply(messages);
        Ok(HistoryView::new(messages, truncated))
    }

    async fn turn_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.turn_locks
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }
}

impl std::fmt::Debug for ConversationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLedger")
            .field("adapters", &self.adapters)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
