//! The top-level router.
//!
//! One [`Router`] owns every shared structure — context registry,
//! middleware list, command and shortcut tables, pending suggestions,
//! live dispatch set — as explicit state behind one handle; there are no
//! module-level globals. Registration is append-only and happens during
//! setup; dispatches read the tables without coordination beyond that
//! happens-before.
//!
//! [`Router::dispatch`] drives one inbound event end to end: snapshot
//! the matching middleware, run the chain, release the dispatch serial
//! exactly once, flush the observed record, and broadcast the processed
//! event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{Instrument, Level, debug, error, span};

use trellis_core::{BoxedSender, BoxedStore, Id, MessageEvent, Scope};

use crate::broadcast::{EventBroadcaster, EventKind, Notice};
use crate::context::{Context, ContextRegistry, Listener};
use crate::pipeline::{BoxedMiddleware, DispatchContext, DispatchState, LiveSet, MiddlewareEntry};
use crate::preprocess::{OriginKey, PendingSuggestion, Preprocessor};
use crate::resolve::{CommandSpec, Resolver, ShortcutRule};

/// Tunables of the resolution pipeline.
///
/// All user-facing prompt text lives here, not in logic.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Nicknames that mark a message as addressed to the endpoint.
    pub nicknames: Vec<String>,
    /// Command prefixes, tried in order. The empty string is a valid
    /// prefix meaning "no prefix required" and matches any text; put it
    /// last if concrete prefixes should win.
    pub prefixes: Vec<String>,
    /// Minimum normalized similarity for a fuzzy suggestion.
    ///
    /// Normalized Levenshtein: a single transposition in a four-letter
    /// name scores 0.5, so the default keeps simple typos suggestable.
    pub similarity: f64,
    /// At-mention pattern; `{self}` expands to the endpoint id.
    pub mention_template: String,
    /// Suggestion prompt; `{command}` and `{accept}` expand.
    pub suggest_prompt: String,
    /// The reply that accepts a pending suggestion.
    pub accept_word: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            nicknames: Vec::new(),
            prefixes: Vec::new(),
            similarity: 0.5,
            mention_template: "@{self}".to_string(),
            suggest_prompt: "Did you mean \"{command}\"? Reply \"{accept}\" to run it.".to_string(),
            accept_word: "yes".to_string(),
        }
    }
}

impl RouterConfig {
    /// The at-mention token for a concrete endpoint id.
    pub fn mention_token(&self, self_id: Id) -> String {
        self.mention_template.replace("{self}", &self_id.to_string())
    }

    /// Renders the suggestion prompt for a command name.
    pub fn render_prompt(&self, command: &str) -> String {
        self.suggest_prompt
            .replace("{command}", command)
            .replace("{accept}", &self.accept_word)
    }
}

/// State shared by the router handle, the preprocessor, and every
/// in-flight dispatch.
pub(crate) struct Shared {
    pub(crate) registry: Arc<ContextRegistry>,
    pub(crate) broadcaster: EventBroadcaster,
    pub(crate) middleware: RwLock<Vec<MiddlewareEntry>>,
    pub(crate) resolver: Resolver,
    pub(crate) pending: Mutex<HashMap<OriginKey, PendingSuggestion>>,
    pub(crate) live: Arc<LiveSet>,
    pub(crate) serial: AtomicU64,
    pub(crate) store: Option<BoxedStore>,
    pub(crate) sender: BoxedSender,
    pub(crate) config: RouterConfig,
}

/// What one dispatch ended up doing.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Unique serial of this dispatch.
    pub serial: u64,
    /// A middleware faulted and the remaining chain was aborted.
    pub faulted: bool,
    /// Name of the command the terminal step executed, if any.
    pub executed_command: Option<String>,
    /// How many user middleware matched the snapshot.
    pub matched_middleware: usize,
}

/// The central router object. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Router {
    shared: Arc<Shared>,
}

impl Router {
    /// Creates a router without a backing store; gating is disabled.
    pub fn new(sender: BoxedSender, config: RouterConfig) -> Self {
        Self::build(sender, None, config)
    }

    /// Creates a router with a backing store; gating and user records
    /// are active.
    pub fn with_store(sender: BoxedSender, store: BoxedStore, config: RouterConfig) -> Self {
        Self::build(sender, Some(store), config)
    }

    fn build(sender: BoxedSender, store: Option<BoxedStore>, config: RouterConfig) -> Self {
        let registry = Arc::new(ContextRegistry::new());
        let broadcaster = EventBroadcaster::new(Arc::clone(&registry));
        Self {
            shared: Arc::new(Shared {
                registry,
                broadcaster,
                middleware: RwLock::new(Vec::new()),
                resolver: Resolver::new(),
                pending: Mutex::new(HashMap::new()),
                live: Arc::new(LiveSet::default()),
                serial: AtomicU64::new(0),
                store,
                sender,
                config,
            }),
        }
    }

    /// The router's configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.shared.config
    }

    /// The root (universal-scope) context.
    pub fn root(&self) -> Arc<Context> {
        self.shared.registry.root()
    }

    /// The context for a scope, created on first request.
    pub fn context(&self, scope: &Scope) -> Arc<Context> {
        self.shared.registry.get_or_create(scope)
    }

    /// Appends a middleware for the given scope.
    ///
    /// Priority across all middleware is global registration order.
    pub fn register_middleware(&self, scope: &Scope, handler: BoxedMiddleware) {
        let context = self.context(scope);
        debug!(scope = %context.key(), "registering middleware");
        self.shared
            .middleware
            .write()
            .push(MiddlewareEntry { context, handler });
    }

    /// Registers a command callable within the given scope.
    pub fn register_command(&self, scope: &Scope, spec: CommandSpec) {
        let context = self.context(scope);
        self.shared.resolver.commands.register(Arc::new(spec), context);
    }

    /// Registers a shortcut rule. Shortcuts match in registration order.
    pub fn register_shortcut(&self, rule: ShortcutRule) {
        self.shared.resolver.register_shortcut(rule);
    }

    /// Attaches a listener to the context of the given scope.
    pub fn on(&self, scope: &Scope, kind: EventKind, listener: Listener) {
        self.context(scope).on(kind, listener);
    }

    /// Broadcasts a lifecycle notice to every context.
    pub async fn announce(&self, kind: EventKind) {
        self.shared
            .broadcaster
            .broadcast(Notice::lifecycle(kind))
            .await;
    }

    /// Drives one inbound event through the pipeline.
    ///
    /// Concurrent dispatches are independent; within this one the chain
    /// runs strictly sequentially in snapshot order.
    pub async fn dispatch(&self, event: MessageEvent) -> DispatchOutcome {
        let shared = &self.shared;
        let serial = shared.serial.fetch_add(1, Ordering::SeqCst) + 1;
        let dispatch_span = span!(Level::DEBUG, "dispatch", serial, sender = event.sender);

        async move {
            shared.live.insert(serial);

            let mut chain: Vec<BoxedMiddleware> =
                vec![Arc::new(Preprocessor::new(Arc::clone(shared)))];
            let matched: Vec<BoxedMiddleware> = {
                let entries = shared.middleware.read();
                entries
                    .iter()
                    .filter(|entry| entry.context.matches(&event))
                    .map(|entry| Arc::clone(&entry.handler))
                    .collect()
            };
            let matched_middleware = matched.len();
            chain.extend(matched);
            debug!(chain_len = chain.len(), "dispatching");

            let ctx = Arc::new(DispatchContext::new(
                event.clone(),
                Arc::clone(&shared.sender),
            ));
            let next = DispatchState::new(
                serial,
                chain,
                Arc::clone(&shared.live),
                Arc::clone(&ctx),
                shared.broadcaster.clone(),
            );

            if let Err(err) = next.proceed().await {
                // Unreachable for a fresh serial; surfaced for diagnosis.
                error!(error = %err, "dispatch aborted before running");
            }
            let faulted = next.is_faulted();

            if !shared.live.remove(serial) {
                error!("dispatch serial released more than once");
            }

            if let Some(store) = shared.store.as_ref() {
                if let Some(record) = ctx.take_record() {
                    if record.is_dirty() {
                        if let Err(err) = store.flush(&record).await {
                            error!(error = %err, "record flush failed");
                            shared
                                .broadcaster
                                .broadcast(Notice::fault(
                                    EventKind::Error,
                                    Some(event.clone()),
                                    err.to_string(),
                                ))
                                .await;
                        }
                    }
                }
            }

            shared
                .broadcaster
                .broadcast(Notice::message(event))
                .await;

            DispatchOutcome {
                serial,
                faulted,
                executed_command: ctx.executed_command(),
                matched_middleware,
            }
        }
        .instrument(dispatch_span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::context::listener_fn;
    use crate::pipeline::{Next, middleware_fn};
    use crate::resolve::command_fn;
    use trellis_core::{
        ChannelFlags, IdentityKind, MemoryStore, MessageId, SendError, Sender, Target, UserRecord,
        UserStore,
    };

    struct RecordingSender {
        sent: Mutex<Vec<(Target, String)>>,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(Target, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Sender for RecordingSender {
        async fn send(&self, target: Target, text: &str) -> Result<MessageId, SendError> {
            self.sent.lock().push((target, text.to_string()));
            Ok("1".to_string())
        }
    }

    fn echo_spec() -> CommandSpec {
        CommandSpec::new(
            "echo",
            command_fn(|inv| async move { Ok(Some(inv.args.join(" "))) }),
        )
    }

    fn counting_middleware(counter: Arc<AtomicUsize>) -> BoxedMiddleware {
        middleware_fn(move |_ctx, next: Next| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                next.proceed().await
            }
        })
    }

    #[tokio::test]
    async fn prefixed_command_executes_and_replies() {
        let sender = RecordingSender::new();
        let router = Router::new(
            sender.clone(),
            RouterConfig {
                prefixes: vec!["!".into()],
                ..RouterConfig::default()
            },
        );
        router.register_command(&Scope::any(), echo_spec());

        let outcome = router
            .dispatch(MessageEvent::private(7, 100, "!echo hi"))
            .await;

        assert_eq!(outcome.executed_command.as_deref(), Some("echo"));
        assert!(!outcome.faulted);
        assert_eq!(sender.sent(), vec![(Target::User(7), "hi".to_string())]);
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            router.register_middleware(
                &Scope::any(),
                middleware_fn(move |_ctx, next: Next| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(tag);
                        next.proceed().await
                    }
                }),
            );
        }

        router.dispatch(MessageEvent::private(7, 100, "hello")).await;
        assert_eq!(*log.lock(), ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn scope_filters_the_snapshot() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::groups([42]), counting_middleware(Arc::clone(&hits)));

        let in_scope = router
            .dispatch(MessageEvent::group(7, 42, 100, "hello"))
            .await;
        let out_of_scope = router
            .dispatch(MessageEvent::group(7, 43, 100, "hello"))
            .await;

        assert_eq!(in_scope.matched_middleware, 1);
        assert_eq!(out_of_scope.matched_middleware, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_dispatch_registration_affects_only_later_dispatches() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let late_hits = Arc::new(AtomicUsize::new(0));

        let registrar = {
            let router = router.clone();
            let late_hits = Arc::clone(&late_hits);
            middleware_fn(move |_ctx, next: Next| {
                let router = router.clone();
                let late_hits = Arc::clone(&late_hits);
                async move {
                    router
                        .register_middleware(&Scope::any(), counting_middleware(late_hits));
                    next.proceed().await
                }
            })
        };
        router.register_middleware(&Scope::any(), registrar);

        router.dispatch(MessageEvent::private(7, 100, "one")).await;
        assert_eq!(late_hits.load(Ordering::SeqCst), 0, "snapshot was mutated");

        router.dispatch(MessageEvent::private(7, 100, "two")).await;
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_continuation_is_reported_once_and_refused() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let reports = Arc::new(AtomicUsize::new(0));
        {
            let reports = Arc::clone(&reports);
            router.on(
                &Scope::any(),
                EventKind::PipelineError,
                listener_fn(move |_notice| {
                    let reports = Arc::clone(&reports);
                    async move {
                        reports.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        let stash: Arc<AsyncMutex<Option<Next>>> = Arc::new(AsyncMutex::new(None));
        {
            let stash = Arc::clone(&stash);
            router.register_middleware(
                &Scope::any(),
                middleware_fn(move |_ctx, next: Next| {
                    let stash = Arc::clone(&stash);
                    async move {
                        *stash.lock().await = Some(next.clone());
                        next.proceed().await
                    }
                }),
            );
        }

        let tail_hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&tail_hits)));

        router.dispatch(MessageEvent::private(7, 100, "hello")).await;
        assert_eq!(tail_hits.load(Ordering::SeqCst), 1);
        assert_eq!(reports.load(Ordering::SeqCst), 0);

        // The dispatch is over; the retained continuation must be refused.
        let stale = stash.lock().await.take().unwrap();
        let err = stale.proceed().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::RouterError::IsolatedContinuation { .. }
        ));
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        // The chain did not re-execute.
        assert_eq!(tail_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fault_aborts_own_chain_only() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let pipeline_faults = Arc::new(AtomicUsize::new(0));
        let general_faults = Arc::new(AtomicUsize::new(0));
        for (kind, counter) in [
            (EventKind::PipelineError, Arc::clone(&pipeline_faults)),
            (EventKind::Error, Arc::clone(&general_faults)),
        ] {
            router.on(
                &Scope::any(),
                kind,
                listener_fn(move |_notice| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        // Faults only inside group 42.
        router.register_middleware(
            &Scope::groups([42]),
            middleware_fn(|_ctx, _next: Next| async move {
                Err(crate::error::RouterError::MiddlewareFault {
                    serial: 0,
                    message: "boom".to_string(),
                })
            }),
        );
        let survivors = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&survivors)));

        let faulted = router
            .dispatch(MessageEvent::group(7, 42, 100, "hello"))
            .await;
        let clean = router
            .dispatch(MessageEvent::group(7, 43, 100, "hello"))
            .await;

        assert!(faulted.faulted);
        assert!(!clean.faulted);
        // The survivor middleware ran only in the clean dispatch.
        assert_eq!(survivors.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline_faults.load(Ordering::SeqCst), 1);
        assert_eq!(general_faults.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn typo_prompts_and_accept_executes() {
        let sender = RecordingSender::new();
        let router = Router::new(
            sender.clone(),
            RouterConfig {
                prefixes: vec!["!".into()],
                ..RouterConfig::default()
            },
        );
        router.register_command(
            &Scope::any(),
            CommandSpec::new("ping", command_fn(|_inv| async move { Ok(Some("pong".into())) })),
        );

        let first = router
            .dispatch(MessageEvent::private(7, 100, "!pign"))
            .await;
        assert_eq!(first.executed_command, None);
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("ping"), "prompt names the suggestion");
        assert!(sent[0].1.contains("yes"), "prompt names the accept word");

        let second = router.dispatch(MessageEvent::private(7, 100, "yes")).await;
        assert_eq!(second.executed_command.as_deref(), Some("ping"));
        assert_eq!(sender.sent().last().unwrap().1, "pong");
    }

    #[tokio::test]
    async fn pending_suggestion_is_one_shot() {
        let sender = RecordingSender::new();
        let router = Router::new(
            sender.clone(),
            RouterConfig {
                prefixes: vec!["!".into()],
                ..RouterConfig::default()
            },
        );
        router.register_command(
            &Scope::any(),
            CommandSpec::new("ping", command_fn(|_inv| async move { Ok(Some("pong".into())) })),
        );

        router.dispatch(MessageEvent::private(7, 100, "!pign")).await;
        // Any other message from the same origin clears the suggestion.
        router
            .dispatch(MessageEvent::private(7, 100, "never mind"))
            .await;
        let late = router.dispatch(MessageEvent::private(7, 100, "yes")).await;
        assert_eq!(late.executed_command, None);
    }

    #[tokio::test]
    async fn no_response_flag_suppresses_unaddressed_events() {
        let sender = RecordingSender::new();
        let store = Arc::new(MemoryStore::new());
        store
            .set_channel_flags(
                IdentityKind::Group,
                42,
                ChannelFlags {
                    no_command: false,
                    no_response: true,
                },
            )
            .await;

        let router = Router::with_store(sender.clone(), store, RouterConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&hits)));

        let outcome = router
            .dispatch(MessageEvent::group(7, 42, 100, "hello"))
            .await;

        assert_eq!(outcome.executed_command, None);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "chain was suppressed");
        assert!(sender.sent().is_empty(), "no outbound send may occur");

        // An at-mention overrides the flag.
        router
            .dispatch(MessageEvent::group(7, 42, 100, "@100 hello"))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_command_flag_drops_resolution_but_chain_continues() {
        let sender = RecordingSender::new();
        let store = Arc::new(MemoryStore::new());
        store
            .set_channel_flags(
                IdentityKind::Group,
                42,
                ChannelFlags {
                    no_command: true,
                    no_response: false,
                },
            )
            .await;

        let router = Router::with_store(
            sender.clone(),
            store,
            RouterConfig {
                prefixes: vec!["!".into()],
                ..RouterConfig::default()
            },
        );
        router.register_command(&Scope::any(), echo_spec());
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&hits)));

        let outcome = router
            .dispatch(MessageEvent::group(7, 42, 100, "!echo hi"))
            .await;

        assert_eq!(outcome.executed_command, None);
        assert!(sender.sent().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1, "remaining chain still ran");
    }

    #[tokio::test]
    async fn ignored_identity_is_suppressed() {
        let store = Arc::new(MemoryStore::new());
        let mut record = UserRecord::new(7, IdentityKind::User);
        record.ignore = true;
        store.insert_record(record).await;

        let router = Router::with_store(
            RecordingSender::new(),
            store,
            RouterConfig::default(),
        );
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&hits)));

        router.dispatch(MessageEvent::private(7, 100, "hello")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn elapsed_ignore_expiry_is_cleared_and_flushed() {
        let store = Arc::new(MemoryStore::new());
        let mut record = UserRecord::new(7, IdentityKind::User);
        record.ignore_until = Some(1); // long elapsed
        store.insert_record(record).await;

        let router = Router::with_store(
            RecordingSender::new(),
            store.clone(),
            RouterConfig::default(),
        );
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&hits)));

        router.dispatch(MessageEvent::private(7, 100, "hello")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "expired ignore no longer gates");

        let flushed = store
            .observe(7, IdentityKind::User, &[])
            .await
            .unwrap();
        assert_eq!(flushed.ignore_until, None, "expiry was cleared and flushed");
    }

    #[tokio::test]
    async fn command_authority_is_enforced() {
        let sender = RecordingSender::new();
        let store = Arc::new(MemoryStore::new());
        let router = Router::with_store(
            sender.clone(),
            store.clone(),
            RouterConfig {
                prefixes: vec!["!".into()],
                ..RouterConfig::default()
            },
        );
        router.register_command(
            &Scope::any(),
            CommandSpec::new("sudo", command_fn(|_inv| async move { Ok(Some("ok".into())) }))
                .authority(1),
        );

        let denied = router
            .dispatch(MessageEvent::private(7, 100, "!sudo"))
            .await;
        assert_eq!(denied.executed_command, None);
        assert!(sender.sent().is_empty(), "denial is silent");

        let mut admin = UserRecord::new(7, IdentityKind::User);
        admin.authority = 1;
        store.insert_record(admin).await;

        let allowed = router
            .dispatch(MessageEvent::private(7, 100, "!sudo"))
            .await;
        assert_eq!(allowed.executed_command.as_deref(), Some("sudo"));
    }

    #[tokio::test]
    async fn message_notice_reaches_matching_contexts() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let root_hits = Arc::new(AtomicUsize::new(0));
        let scoped_hits = Arc::new(AtomicUsize::new(0));
        for (scope, counter) in [
            (Scope::any(), Arc::clone(&root_hits)),
            (Scope::groups([99]), Arc::clone(&scoped_hits)),
        ] {
            router.on(
                &scope,
                EventKind::Message,
                listener_fn(move |_notice| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        router
            .dispatch(MessageEvent::group(7, 42, 100, "hello"))
            .await;
        assert_eq!(root_hits.load(Ordering::SeqCst), 1);
        assert_eq!(scoped_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_dispatches_do_not_interfere() {
        let router = Router::new(RecordingSender::new(), RouterConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        router.register_middleware(&Scope::any(), counting_middleware(Arc::clone(&hits)));

        let mut handles = Vec::new();
        for i in 0..8 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                router
                    .dispatch(MessageEvent::private(i, 100, "hello"))
                    .await
            }));
        }
        let mut serials = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(!outcome.faulted);
            serials.push(outcome.serial);
        }
        serials.sort_unstable();
        serials.dedup();
        assert_eq!(serials.len(), 8, "serials are unique per dispatch");
        assert_eq!(hits.load(Ordering::SeqCst), 8);
    }
}
