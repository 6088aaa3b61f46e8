//! solarledger — a unified conversation ledger with pluggable agent adapters.
//!
//! Every message, user or agent, structured or plain, lives in one durable
//! append-only transcript per conversation. Heterogeneous agent backends plug
//! in behind the [`AgentAdapter`] seam; engines with their own session memory
//! are kept eventually consistent through a watermarked [`SessionBridge`],
//! with the store always remaining ground truth. Replaying history goes
//! through the same projection as live turns, so a conversation reloads
//! exactly as it rendered.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod ledger;
pub mod render;
pub mod store;

pub use adapter::{AdapterRegistry, AgentAdapter, AgentError, AgentKind, HistoryView};
pub use bridge::{EngineEntry, EngineSession, MemoryEngineSession, SessionBridge};
pub use config::{BusyPolicy, HistoryWindow, LedgerConfig};
pub use content::{ChartType, ContentUnit, Scalar, Series, SeriesPoint};
pub use error::{LedgerError, Result};
pub use ledger::ConversationLedger;
pub use render::{DisplayForm, project};
pub use store::{
    Conversation, MemoryMessageStore, Message, MessageStore, Sender, SqliteMessageStore,
};
