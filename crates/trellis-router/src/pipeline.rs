//! The per-event middleware pipeline.
//!
//! Each dispatch snapshots the registered middleware whose context
//! matches the event, in global registration order, and drives them as
//! a continuation-passing chain. The chain is an explicit task list
//! consumed by an index cursor; dispatch identity is a serial held in a
//! shared live set, which is the only safety net against a handler
//! resuming a continuation after its dispatch ended.
//!
//! # Semantics
//!
//! - [`Next::proceed`] advances to the next handler in the snapshot.
//! - [`Next::proceed_with`] first appends a one-shot tail handler to the
//!   end of the chain, then advances — command execution uses this to
//!   install a deterministic terminal step.
//! - A handler that returns without proceeding ends the chain early.
//! - A handler error marks the dispatch faulted and is reported through
//!   two notices ([`EventKind::PipelineError`] and [`EventKind::Error`]);
//!   the remaining chain does not run, other dispatches are unaffected.
//! - A continuation invoked after its dispatch left the live set is an
//!   isolated continuation: reported, refused, never re-executed.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{error, trace, warn};

use trellis_core::{BoxedSender, MessageEvent, UserRecord};

use crate::broadcast::{EventBroadcaster, EventKind, Notice};
use crate::context::Context;
use crate::error::{RouterError, RouterResult};
use crate::resolve::ParsedCommandLine;

/// The future type every middleware returns.
pub type MiddlewareFuture = BoxFuture<'static, RouterResult<()>>;

/// A handler in the middleware chain.
///
/// Implemented automatically for closures of the right shape; use
/// [`middleware_fn`] to avoid writing the boxing by hand.
pub trait Middleware: Send + Sync + 'static {
    /// Processes the event and decides whether to continue the chain.
    fn handle(&self, ctx: Arc<DispatchContext>, next: Next) -> MiddlewareFuture;
}

impl<F> Middleware for F
where
    F: Fn(Arc<DispatchContext>, Next) -> MiddlewareFuture + Send + Sync + 'static,
{
    fn handle(&self, ctx: Arc<DispatchContext>, next: Next) -> MiddlewareFuture {
        (self)(ctx, next)
    }
}

/// A shared, type-erased middleware handle.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Wraps an async closure into a [`BoxedMiddleware`].
pub fn middleware_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Arc<DispatchContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RouterResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<DispatchContext>, next: Next| -> MiddlewareFuture {
        Box::pin(f(ctx, next))
    })
}

/// A registered (context, handler) pair.
///
/// Entries keep global registration order; that order, not anything
/// scope-specific, decides priority when several entries match the same
/// event.
#[derive(Clone)]
pub struct MiddlewareEntry {
    /// The context whose scope gates this handler.
    pub context: Arc<Context>,
    /// The handler itself.
    pub handler: BoxedMiddleware,
}

/// Per-event state handed to every handler of one dispatch.
///
/// The event, the sender handle, the slots the preprocessor fills
/// (resolved command, observed user record), and a typed state map for
/// handler-to-handler data.
pub struct DispatchContext {
    event: MessageEvent,
    sender: BoxedSender,
    command: Mutex<Option<ParsedCommandLine>>,
    record: Mutex<Option<UserRecord>>,
    executed: Mutex<Option<String>>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl DispatchContext {
    pub(crate) fn new(event: MessageEvent, sender: BoxedSender) -> Self {
        Self {
            event,
            sender,
            command: Mutex::new(None),
            record: Mutex::new(None),
            executed: Mutex::new(None),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// The inbound event being dispatched.
    pub fn event(&self) -> &MessageEvent {
        &self.event
    }

    /// The outbound sender for this process.
    pub fn sender(&self) -> &BoxedSender {
        &self.sender
    }

    /// The command the resolver attached to this dispatch, if any.
    pub fn command(&self) -> Option<ParsedCommandLine> {
        self.command.lock().clone()
    }

    pub(crate) fn set_command(&self, parsed: ParsedCommandLine) {
        *self.command.lock() = Some(parsed);
    }

    pub(crate) fn take_command(&self) -> Option<ParsedCommandLine> {
        self.command.lock().take()
    }

    /// A clone of the user record observed for this dispatch, if a store
    /// is configured.
    pub fn record(&self) -> Option<UserRecord> {
        self.record.lock().clone()
    }

    /// Mutates the observed record in place; changes are flushed once
    /// when the dispatch completes.
    pub fn with_record_mut<R>(&self, f: impl FnOnce(&mut UserRecord) -> R) -> Option<R> {
        self.record.lock().as_mut().map(f)
    }

    pub(crate) fn set_record(&self, record: UserRecord) {
        *self.record.lock() = Some(record);
    }

    pub(crate) fn take_record(&self) -> Option<UserRecord> {
        self.record.lock().take()
    }

    /// Name of the command the terminal step executed, if any.
    pub fn executed_command(&self) -> Option<String> {
        self.executed.lock().clone()
    }

    pub(crate) fn note_executed(&self, name: &str) {
        *self.executed.lock() = Some(name.to_string());
    }

    /// Stores a value in the dispatch-local typed state map.
    ///
    /// One value per type; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the typed state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns a value from the typed state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// The set of dispatch serials currently in flight.
///
/// A serial is inserted when its dispatch starts and removed exactly
/// once on completion; any continuation seen afterwards is isolated.
#[derive(Default)]
pub(crate) struct LiveSet {
    inner: Mutex<HashSet<u64>>,
}

impl LiveSet {
    pub(crate) fn insert(&self, serial: u64) {
        self.inner.lock().insert(serial);
    }

    pub(crate) fn contains(&self, serial: u64) -> bool {
        self.inner.lock().contains(&serial)
    }

    /// Removes the serial, returning whether it was present.
    pub(crate) fn remove(&self, serial: u64) -> bool {
        self.inner.lock().remove(&serial)
    }
}

/// Shared execution state of one dispatch.
pub(crate) struct DispatchState {
    serial: u64,
    chain: Mutex<Vec<BoxedMiddleware>>,
    cursor: AtomicUsize,
    faulted: AtomicBool,
    live: Arc<LiveSet>,
    ctx: Arc<DispatchContext>,
    broadcaster: EventBroadcaster,
}

impl DispatchState {
    /// Builds the state for one dispatch and the head continuation that
    /// drives it. The chain snapshot is fixed here; later registrations
    /// never affect this dispatch.
    pub(crate) fn new(
        serial: u64,
        chain: Vec<BoxedMiddleware>,
        live: Arc<LiveSet>,
        ctx: Arc<DispatchContext>,
        broadcaster: EventBroadcaster,
    ) -> Next {
        Next {
            state: Arc::new(Self {
                serial,
                chain: Mutex::new(chain),
                cursor: AtomicUsize::new(0),
                faulted: AtomicBool::new(false),
                live,
                ctx,
                broadcaster,
            }),
        }
    }
}

/// The continuation handed to every middleware.
///
/// Cloneable; a handler may stash it, but once the dispatch completes
/// any invocation is refused as an isolated continuation.
#[derive(Clone)]
pub struct Next {
    state: Arc<DispatchState>,
}

impl Next {
    /// Serial of the dispatch this continuation belongs to.
    pub fn serial(&self) -> u64 {
        self.state.serial
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.state.faulted.load(Ordering::SeqCst)
    }

    /// Advances to the next handler in the chain.
    pub async fn proceed(&self) -> RouterResult<()> {
        self.advance(None).await
    }

    /// Appends a one-shot tail handler to the end of the chain, then
    /// advances. The tail runs after every other snapshot handler,
    /// making it a deterministic terminal step.
    pub async fn proceed_with(&self, tail: BoxedMiddleware) -> RouterResult<()> {
        self.advance(Some(tail)).await
    }

    async fn advance(&self, tail: Option<BoxedMiddleware>) -> RouterResult<()> {
        let st = &self.state;

        if !st.live.contains(st.serial) {
            let err = RouterError::IsolatedContinuation { serial: st.serial };
            warn!(serial = st.serial, "isolated continuation refused");
            st.broadcaster
                .broadcast(Notice::fault(
                    EventKind::PipelineError,
                    Some(st.ctx.event().clone()),
                    err.to_string(),
                ))
                .await;
            return Err(err);
        }

        if st.faulted.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tail) = tail {
            st.chain.lock().push(tail);
        }

        let index = st.cursor.fetch_add(1, Ordering::SeqCst);
        let handler = st.chain.lock().get(index).cloned();
        let Some(handler) = handler else {
            // Chain exhausted; completion bookkeeping happens in the driver.
            return Ok(());
        };

        trace!(serial = st.serial, index, "running middleware");
        match handler.handle(Arc::clone(&st.ctx), self.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                st.faulted.store(true, Ordering::SeqCst);
                error!(serial = st.serial, index, error = %err, "middleware fault");
                let fault = RouterError::MiddlewareFault {
                    serial: st.serial,
                    message: err.to_string(),
                };
                let detail = fault.to_string();
                let event = st.ctx.event().clone();
                st.broadcaster
                    .broadcast(Notice::fault(
                        EventKind::PipelineError,
                        Some(event.clone()),
                        detail.clone(),
                    ))
                    .await;
                st.broadcaster
                    .broadcast(Notice::fault(EventKind::Error, Some(event), detail))
                    .await;
                // Contained: callers up-chain resume normally, the
                // handlers past the faulty one simply never run.
                Ok(())
            }
        }
    }
}
