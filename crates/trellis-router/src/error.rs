//! Error types for the router layer.

use thiserror::Error;

use trellis_core::{SendError, StoreError};

/// Errors surfaced by dispatching and middleware execution.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A continuation was invoked after its dispatch completed.
    ///
    /// The dispatch is not restarted; every stale invocation is reported
    /// once and refused.
    #[error("continuation invoked after dispatch {serial} completed")]
    IsolatedContinuation {
        /// Serial of the completed dispatch.
        serial: u64,
    },

    /// A middleware handler failed during a dispatch.
    ///
    /// The remaining chain for that dispatch is aborted; other dispatches
    /// are unaffected.
    #[error("middleware fault in dispatch {serial}: {message}")]
    MiddlewareFault {
        /// Serial of the affected dispatch.
        serial: u64,
        /// Rendered cause.
        message: String,
    },

    /// A command handler failed.
    #[error("command '{name}' failed: {message}")]
    CommandFault {
        /// The executed command name.
        name: String,
        /// Rendered cause.
        message: String,
    },

    /// The state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The outbound transport failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;
