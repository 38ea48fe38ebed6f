//! # Trellis
//!
//! A scoped, middleware-driven chat event router.
//!
//! ## Overview
//!
//! Trellis routes inbound chat events through a continuation-passing
//! middleware pipeline. Middleware, commands, shortcuts, and listeners
//! are registered against *scopes* — three-axis filters over user,
//! group, and discuss ids — and each dispatch runs its own snapshot of
//! the matching chain.
//!
//! ```text
//! ┌─────────┐    ┌──────────────┐    ┌────────────────────────────────┐
//! │ Runtime │───▶│    Router    │───▶│ preprocessor → middleware …    │──▶ terminal
//! │ (feed)  │    │  (dispatch)  │    │ (per-dispatch chain snapshot)  │    command step
//! └─────────┘    └──────────────┘    └────────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, lifecycle, one task per event
//! - **Router**: registration surface and the dispatch driver
//! - **Middleware**: chain handlers that decide whether to continue
//! - **Commands**: resolved from text by prefix, nickname, shortcut, or
//!   fuzzy suggestion
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TrellisRuntime::builder().sender(my_sender).build()?;
//!
//!     runtime.router().register_command(
//!         &Scope::any(),
//!         CommandSpec::new("echo", command_fn(|inv| async move {
//!             Ok(Some(inv.args.join(" ")))
//!         })),
//!     );
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub use trellis_core as core;
pub use trellis_router as router;
pub use trellis_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use trellis_runtime::{RuntimeBuilder, TrellisRuntime};

    // Events and scopes
    pub use trellis_core::{Axis, Id, MessageEvent, Scope, Target};

    // Boundaries
    pub use trellis_core::{BoxedSender, BoxedStore, MemoryStore, Sender, UserRecord, UserStore};

    // Router surface
    pub use trellis_router::{
        CommandInvocation, CommandSpec, DispatchContext, DispatchOutcome, EventKind, Next, Notice,
        Router, RouterConfig, ShortcutRule, command_fn, listener_fn, middleware_fn,
    };
}
