//! Application state observed by the presentation layer.

use std::sync::Arc;

use crate::models::ResponseEnvelope;

/// One observable state. Each operation emits a placeholder and then
/// exactly one terminal state (`Loaded` or `Error`).
#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Loading,
    Loaded { envelope: Arc<ResponseEnvelope> },
    Error { detail: String },
}

impl AppState {
    pub fn loaded(envelope: Arc<ResponseEnvelope>) -> Self {
        AppState::Loaded { envelope }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        AppState::Error {
            detail: detail.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AppState::Error { .. })
    }

    /// The envelope carried by a `Loaded` state.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            AppState::Loaded { envelope } => Some(envelope),
            _ => None,
        }
    }
}
