//! Error types for the edit-lock core.

use thiserror::Error;

use crate::types::DocumentId;

/// An intent the session cannot accept in its current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{intent} not allowed while document {document} is {phase}")]
    InvalidTransition {
        document: DocumentId,
        phase: &'static str,
        intent: &'static str,
    },

    #[error("document {0} is not open")]
    UnknownDocument(DocumentId),

    #[error("force-take on {0} requires an elevated role and another holder")]
    ForceTakeNotAllowed(DocumentId),

    #[error("unknown role: {0}")]
    UnknownRole(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("idle check interval ({idle_check_ms}ms) must be shorter than the inactivity threshold ({threshold_ms}ms)")]
    IdleCheckTooSlow { idle_check_ms: u64, threshold_ms: u64 },
}
