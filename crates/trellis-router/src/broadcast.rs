//! Event broadcasting to matching contexts.
//!
//! After a dispatch is processed (and whenever a fault is reported), a
//! [`Notice`] is delivered to every registered context whose scope
//! matches the originating event. Order across contexts is registration
//! order, but that is an implementation detail — the only guarantee is
//! that every match fires and no context can suppress delivery to
//! another.

use std::sync::Arc;

use tracing::trace;

use trellis_core::MessageEvent;

use crate::context::ContextRegistry;

/// Kinds of events contexts can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A fully processed inbound message.
    Message,
    /// A command was executed.
    Command,
    /// A pipeline-level fault (middleware fault, isolated continuation).
    PipelineError,
    /// A general fault; every [`EventKind::PipelineError`] is mirrored
    /// here, as are flush and send failures.
    Error,
    /// The process started serving dispatches.
    Startup,
    /// The process is shutting down.
    Shutdown,
}

/// Payload delivered to context listeners.
#[derive(Debug, Clone)]
pub struct Notice {
    /// What happened.
    pub kind: EventKind,
    /// The originating event, when there is one. Lifecycle notices carry
    /// none and are delivered to every context.
    pub event: Option<MessageEvent>,
    /// Kind-specific detail: the executed command name for
    /// [`EventKind::Command`], a rendered error for the fault kinds.
    pub detail: Option<String>,
}

impl Notice {
    /// A processed-message notice.
    pub fn message(event: MessageEvent) -> Self {
        Self {
            kind: EventKind::Message,
            event: Some(event),
            detail: None,
        }
    }

    /// A command-executed notice.
    pub fn command(event: MessageEvent, name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Command,
            event: Some(event),
            detail: Some(name.into()),
        }
    }

    /// A fault notice of the given kind.
    pub fn fault(kind: EventKind, event: Option<MessageEvent>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            event,
            detail: Some(detail.into()),
        }
    }

    /// A lifecycle notice with no originating event.
    pub fn lifecycle(kind: EventKind) -> Self {
        Self {
            kind,
            event: None,
            detail: None,
        }
    }
}

/// Delivers notices to the local listeners of every matching context.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<ContextRegistry>,
}

impl EventBroadcaster {
    /// Creates a broadcaster over the given registry.
    pub fn new(registry: Arc<ContextRegistry>) -> Self {
        Self { registry }
    }

    /// Fires the notice at every context whose scope matches its event.
    ///
    /// Notices without an event (lifecycle) fire everywhere.
    pub async fn broadcast(&self, notice: Notice) {
        trace!(kind = ?notice.kind, "broadcasting notice");
        for context in self.registry.snapshot() {
            let matched = match &notice.event {
                Some(event) => context.matches(event),
                None => true,
            };
            if !matched {
                continue;
            }
            for listener in context.listeners_for(notice.kind) {
                listener(notice.clone()).await;
            }
        }
    }
}
