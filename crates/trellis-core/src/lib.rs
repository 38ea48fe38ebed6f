//! # Trellis Core
//!
//! Foundation types for the Trellis chat event router:
//!
//! - [`MessageEvent`] — the transport-boundary shape of an inbound message
//! - [`Scope`] / [`Axis`] — the three-axis visibility model
//! - [`Sender`] — the outbound transport boundary
//! - [`UserStore`] / [`UserRecord`] — the asynchronous state-store boundary
//!
//! The routing machinery itself (contexts, middleware pipeline, command
//! resolution) lives in `trellis-router`; this crate only defines the
//! data model and the external collaborator traits.

pub mod error;
pub mod event;
pub mod scope;
pub mod sender;
pub mod store;

pub use error::{ScopeError, SendError, SendResult, StoreError, StoreResult};
pub use event::{ChatKind, Id, IdentityKind, MessageEvent, Target};
pub use scope::{Axis, Scope};
pub use sender::{
    BoxedSender, IMAGE_PLACEHOLDER, MAX_OUTBOUND_CHARS, MessageId, Sender, TRUNCATION_MARKER,
    render_outbound,
};
pub use store::{
    BoxedStore, ChannelFlags, MemoryStore, UNIVERSAL_FIELDS, UserRecord, UserStore,
};
