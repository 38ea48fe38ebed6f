//! Unified error types for the trellis core boundaries.

use thiserror::Error;

use crate::event::{Id, IdentityKind, Target};

/// Errors produced by scope key parsing.
#[derive(Debug, Clone, Error)]
pub enum ScopeError {
    /// The key does not follow the canonical `u…|g…|d…` shape.
    #[error("invalid scope key: '{0}'")]
    InvalidKey(String),

    /// An axis set contained a non-numeric id.
    #[error("invalid id '{value}' in scope key")]
    InvalidId {
        /// The offending token.
        value: String,
    },
}

/// Errors produced by the outbound transport boundary.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The target cannot be reached on this transport.
    #[error("target {0:?} is unreachable")]
    Unreachable(Target),

    /// The transport failed while sending.
    #[error("failed to send message: {0}")]
    Transport(String),
}

/// Errors produced by the user-state store boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused an operation for this identity.
    #[error("store rejected {kind:?} {id}: {reason}")]
    Rejected {
        /// Identity dimension.
        kind: IdentityKind,
        /// Identity id.
        id: Id,
        /// Store-reported reason.
        reason: String,
    },

    /// A record failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for send operations.
pub type SendResult<T> = Result<T, SendError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
