//! Contexts and the canonical-scope registry.
//!
//! A [`Context`] is the runtime object bound to one canonical scope: it
//! owns the scope, its local event listeners, and nothing else. Contexts
//! are created lazily by the [`ContextRegistry`], deduplicated by
//! canonical scope key, and cached for the process lifetime — the
//! "hierarchy" of scopes is a flat registry plus the pure matching
//! function on [`Scope`], never a tree of inheriting objects.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use trellis_core::{MessageEvent, Scope};

use crate::broadcast::{EventKind, Notice};

/// A local listener attached to one context for one event kind.
pub type Listener = Arc<dyn Fn(Notice) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into a [`Listener`].
pub fn listener_fn<F, Fut>(f: F) -> Listener
where
    F: Fn(Notice) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |notice: Notice| -> BoxFuture<'static, ()> { Box::pin(f(notice)) })
}

/// The runtime object bound to one canonical scope.
pub struct Context {
    scope: Scope,
    key: String,
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl Context {
    fn new(scope: Scope) -> Self {
        let key = scope.key();
        Self {
            scope,
            key,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// The canonical scope this context is bound to.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The canonical scope key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this context's scope matches the given event.
    pub fn matches(&self, event: &MessageEvent) -> bool {
        self.scope.matches(event)
    }

    /// Appends a local listener for the given event kind.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().entry(kind).or_default().push(listener);
    }

    pub(crate) fn listeners_for(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .lock()
            .get(&kind)
            .map(|ls| ls.to_vec())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("key", &self.key).finish()
    }
}

struct RegistryInner {
    by_key: HashMap<String, Arc<Context>>,
    /// Registration order, for deterministic broadcast iteration.
    order: Vec<Arc<Context>>,
}

/// Process-wide registry of contexts keyed by canonical scope string.
pub struct ContextRegistry {
    inner: RwLock<RegistryInner>,
    root: Arc<Context>,
}

impl ContextRegistry {
    /// Creates a registry holding only the root (universal) context.
    pub fn new() -> Self {
        let root = Arc::new(Context::new(Scope::any()));
        let mut by_key = HashMap::new();
        by_key.insert(root.key().to_string(), Arc::clone(&root));
        Self {
            inner: RwLock::new(RegistryInner {
                by_key,
                order: vec![Arc::clone(&root)],
            }),
            root,
        }
    }

    /// The context with the universal scope.
    ///
    /// Process-wide middleware and commands belong here unless scoped
    /// otherwise.
    pub fn root(&self) -> Arc<Context> {
        Arc::clone(&self.root)
    }

    /// Returns the context for a scope, creating and caching it on first
    /// request.
    ///
    /// Idempotent: equivalent scopes built from unsorted id sets
    /// canonicalize to the same key and yield the identical instance.
    pub fn get_or_create(&self, scope: &Scope) -> Arc<Context> {
        let key = scope.key();
        if let Some(ctx) = self.inner.read().by_key.get(&key) {
            return Arc::clone(ctx);
        }
        let mut inner = self.inner.write();
        // Lost the race between read unlock and write lock.
        if let Some(ctx) = inner.by_key.get(&key) {
            return Arc::clone(ctx);
        }
        debug!(scope = %key, "creating context");
        let ctx = Arc::new(Context::new(scope.clone()));
        inner.by_key.insert(key, Arc::clone(&ctx));
        inner.order.push(Arc::clone(&ctx));
        ctx
    }

    /// All contexts in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Context>> {
        self.inner.read().order.to_vec()
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// `true` only before construction completes; the root always exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_scopes_share_one_context() {
        let registry = ContextRegistry::new();
        let a = registry.get_or_create(&Scope::users([3, 1, 2]));
        let b = registry.get_or_create(&Scope::users([2, 1, 3, 3]));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2); // root + one
    }

    #[test]
    fn root_is_universal_and_cached() {
        let registry = ContextRegistry::new();
        assert!(registry.root().scope().is_universal());
        let again = registry.get_or_create(&Scope::any());
        assert!(Arc::ptr_eq(&registry.root(), &again));
    }

    #[test]
    fn distinct_scopes_get_distinct_contexts() {
        let registry = ContextRegistry::new();
        let users = registry.get_or_create(&Scope::users([1]));
        let groups = registry.get_or_create(&Scope::groups([1]));
        assert!(!Arc::ptr_eq(&users, &groups));
    }
}
