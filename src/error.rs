//! Error taxonomy for the ledger core.
//!
//! Storage and content-integrity failures always propagate to the caller —
//! they mean the transcript's guarantees are at risk. Adapter and mirroring
//! failures are contained by the ledger (see `ledger.rs`): an adapter failure
//! becomes a persisted synthetic text unit, a mirror failure is logged and
//! retried via the watermark on the next turn.

use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A stored payload's variant tag is missing, unrecognized, or doesn't
    /// match its body. Never downgraded to plain text on the read path.
    #[error("malformed content: {0}")]
    MalformedContent(String),

    /// The backing store failed. Either the message was durably stored with
    /// an id, or this error was raised and no id was consumed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(anyhow::Error),

    /// An adapter failed to produce content for a turn. Contained by the
    /// ledger; surfaces only when an adapter is invoked outside a turn.
    #[error("agent processing failed: {0}")]
    AgentProcessing(String),

    /// A turn is already in flight for this conversation. Transient — retry
    /// after the in-flight turn completes.
    #[error("conversation '{0}' already has a turn in flight")]
    ConversationBusy(String),

    #[error("conversation '{0}' not found")]
    ConversationNotFound(String),

    /// No adapter is registered for the agent kind a conversation was
    /// created with. Adapters are registered at process start, so this is a
    /// wiring error, not a runtime condition.
    #[error("no adapter registered for agent kind '{0}'")]
    AdapterUnavailable(String),

    #[error("invalid ledger config: {0}")]
    Config(String),
}

impl LedgerError {
    /// Wrap a backing-store failure, attaching context the caller will see.
    pub fn storage(error: impl Into<anyhow::Error>) -> Self {
        LedgerError::StorageUnavailable(error.into())
    }
}
