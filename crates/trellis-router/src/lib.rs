//! Scoped event routing: contexts, middleware pipeline, command
//! resolution, and event broadcasting on top of [`trellis_core`].
//!
//! The central type is [`Router`]. Register middleware, commands,
//! shortcuts, and listeners against [`Scope`](trellis_core::Scope)s,
//! then feed inbound [`MessageEvent`](trellis_core::MessageEvent)s to
//! [`Router::dispatch`]; each dispatch runs its own snapshot of the
//! middleware chain sequentially while dispatches stay independent of
//! each other.

pub mod broadcast;
pub mod context;
pub mod error;
pub mod pipeline;
mod preprocess;
pub mod resolve;
pub mod router;

pub use broadcast::{EventBroadcaster, EventKind, Notice};
pub use context::{Context, ContextRegistry, Listener, listener_fn};
pub use error::{RouterError, RouterResult};
pub use pipeline::{
    BoxedMiddleware, DispatchContext, Middleware, MiddlewareFuture, Next, middleware_fn,
};
pub use resolve::{
    CommandHandler, CommandInvocation, CommandSpec, ParsedCommandLine, ShortcutRule, StripOutcome,
    Suggestion, command_fn,
};
pub use router::{DispatchOutcome, Router, RouterConfig};
