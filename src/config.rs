//! Ledger configuration.

use crate::error::{LedgerError, Result};
use crate::store::Message;

use serde::{Deserialize, Serialize};

/// How much transcript an adapter sees per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    /// Full transcript every turn.
    Unlimited,
    /// Most recent N messages only.
    Limited(usize),
}

impl HistoryWindow {
    /// Apply the window to an ordered transcript. Returns the (possibly
    /// shortened) tail and whether anything was dropped.
    pub(crate) fn apply(&self, mut messages: Vec<Message>) -> (Vec<Message>, bool) {
        match self {
            HistoryWindow::Unlimited => (messages, false),
            HistoryWindow::Limited(n) => {
                if messages.len() > *n {
                    let drop = messages.len() - n;
                    messages.drain(..drop);
                    (messages, true)
                } else {
                    (messages, false)
                }
            }
        }
    }
}

/// What happens when a turn arrives while another is in flight on the same
/// conversation. Interleaving is never an option — it would interleave ids
/// from two turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Fail fast with `ConversationBusy`; the caller retries.
    Reject,
    /// Wait for the in-flight turn to complete, then run.
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub history_window: HistoryWindow,
    pub busy_policy: BusyPolicy,
    /// Bounded retries for persisting already-produced agent units before
    /// surfacing a storage failure. The user-message append is never
    /// retried — failing before dispatch costs no inference.
    pub storage_retry_limit: u32,
    /// Text of the synthetic unit persisted when an adapter fails.
    pub error_unit_text: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            history_window: HistoryWindow::Limited(50),
            busy_policy: BusyPolicy::Reject,
            storage_retry_limit: 3,
            error_unit_text: "The assistant could not complete this request. Please try again."
                .into(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|error| LedgerError::Config(error.to_string()))
    }
}
