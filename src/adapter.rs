//! The agent adapter seam: one implementation per backing engine.
//!
//! Adapters turn a user message into an ordered sequence of content units.
//! They never write to the message store, never keep per-instance mutable
//! state, and see history only through the read-only view the ledger hands
//! them — which may be bounded, so adapters must not assume it is complete.

use crate::content::ContentUnit;
use crate::store::Message;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Which backing engine handles a conversation. Fixed at conversation
/// creation; the ledger refuses to dispatch through anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// SQL/DataFrame analysis over the market database.
    AnalysisEngine,
    /// Vector search over the document corpus.
    VectorSearch,
    /// Intent classification routing to data or plotting sub-paths.
    ClassifyPlot,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::AnalysisEngine => "analysis_engine",
            AgentKind::VectorSearch => "vector_search",
            AgentKind::ClassifyPlot => "classify_plot",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "analysis_engine" => Ok(AgentKind::AnalysisEngine),
            "vector_search" => Ok(AgentKind::VectorSearch),
            "classify_plot" => Ok(AgentKind::ClassifyPlot),
            other => Err(format!(
                "invalid agent kind: '{other}', expected 'analysis_engine', 'vector_search', or 'classify_plot'"
            )),
        }
    }
}

/// Adapter-level failure (upstream API error, timeout, invalid output).
/// The ledger converts this into a persisted synthetic text unit so the
/// transcript keeps a record of the attempt.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct AgentError {
    pub cause: String,
}

impl AgentError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Read-only window over a conversation's transcript, ordered by message id.
///
/// The ledger may bound this to the most recent N messages for cost control
/// (`HistoryWindow` in the config); `truncated` tells the adapter that older
/// context was dropped.
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    messages: Vec<Message>,
    truncated: bool,
}

impl HistoryView {
    pub(crate) fn new(messages: Vec<Message>, truncated: bool) -> Self {
        Self {
            messages,
            truncated,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True when older messages were dropped by the history window.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Capability interface implemented once per backing engine.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// The agent kind this adapter serves.
    fn kind(&self) -> AgentKind;

    /// Static declaration: does this adapter's engine carry its own session
    /// memory that the ledger should mirror into? Declared once per variant,
    /// never per call — the ledger applies the mirror step from this alone,
    /// regardless of which internal branch of `handle` ran.
    fn wants_session_mirroring(&self) -> bool;

    /// Produce one or more content units for a user message. Order is render
    /// order. Returning an empty sequence is treated as a processing failure.
    async fn handle(
        &self,
        conversation_id: &str,
        user_text: &str,
        context: &HistoryView,
    ) -> std::result::Result<Vec<ContentUnit>, AgentError>;
}

/// Adapters registered at process start, keyed by the kind they serve.
/// No runtime discovery or hot-swap.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<AgentKind, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the kind it declares. Replaces any previous
    /// registration for that kind.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    struct EchoAdapter;

    #[async_trait]
    impl AgentAdapter for EchoAdapter {
        fn kind(&self) -> AgentKind {
            AgentKind::AnalysisEngine
        }

        fn wants_session_mirroring(&self) -> bool {
            false
        }

        async fn handle(
            &self,
            _conversation_id: &str,
            user_text: &str,
            _context: &HistoryView,
        ) -> std::result::Result<Vec<ContentUnit>, AgentError> {
            Ok(vec![ContentUnit::text(user_text)])
        }
    }

    #[test]
    fn agent_kind_string_round_trip() {
        for kind in [
            AgentKind::AnalysisEngine,
            AgentKind::VectorSearch,
            AgentKind::ClassifyPlot,
        ] {
            assert_eq!(AgentKind::from_str(kind.as_str()), Ok(kind));
        }
        assert!(AgentKind::from_str("price_agent").is_err());
    }

    #[test]
    fn registry_resolves_by_declared_kind() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(EchoAdapter));

        assert!(registry.get(AgentKind::AnalysisEngine).is_some());
        assert!(registry.get(AgentKind::VectorSearch).is_none());
    }
}
