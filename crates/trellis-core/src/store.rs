//! User-state store boundary.
//!
//! Per-identity state (display name, authority, ignore flags, arbitrary
//! extras) lives behind the [`UserStore`] trait. The router observes a
//! record once per dispatch, makes its gating decisions from it, and
//! flushes it back once at the end if anything changed. Per-scope gating
//! flags come from the same store via [`UserStore::channel_flags`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::StoreError;
use crate::event::{ChatKind, Id, IdentityKind, MessageEvent};

/// Fields every dispatch needs regardless of the resolved command.
pub const UNIVERSAL_FIELDS: &[&str] = &["name", "authority", "ignore_until"];

/// Per-scope gating flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelFlags {
    /// Suppress command parsing in this scope.
    pub no_command: bool,
    /// Suppress non-command responses unless the endpoint is explicitly
    /// addressed.
    pub no_response: bool,
}

/// A live, flushable snapshot of one identity's stored state.
///
/// Mutations must go through methods that mark the record dirty; only
/// dirty records are flushed at the end of a dispatch.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// The identity this record belongs to.
    pub id: Id,
    /// Which identity dimension the id lives on.
    pub kind: IdentityKind,
    /// Display name, if known.
    pub name: Option<String>,
    /// Authority level; commands declare the minimum they require.
    pub authority: u8,
    /// Permanently suppress all processing for this identity.
    pub ignore: bool,
    /// Suppress processing until this unix timestamp (seconds).
    pub ignore_until: Option<u64>,
    /// Free-form fields commands declared and the store loaded.
    pub extra: Map<String, Value>,
    dirty: bool,
}

impl UserRecord {
    /// Creates a fresh record with per-kind defaults.
    pub fn new(id: Id, kind: IdentityKind) -> Self {
        Self {
            id,
            kind,
            name: None,
            authority: 0,
            ignore: false,
            ignore_until: None,
            extra: Map::new(),
            dirty: false,
        }
    }

    /// Marks the record as needing a flush.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether the record has unflushed changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears an elapsed ignore expiry and marks the record dirty.
    pub fn clear_ignore_until(&mut self) {
        if self.ignore_until.take().is_some() {
            self.dirty = true;
        }
    }

    /// Sets a free-form field and marks the record dirty.
    pub fn set_extra(&mut self, field: impl Into<String>, value: Value) {
        self.extra.insert(field.into(), value);
        self.dirty = true;
    }
}

/// The asynchronous record-observation API the router consumes.
///
/// Failure to reach the store must not corrupt gating decisions already
/// made from a previously observed record; flush failures are reported
/// by the caller, never retried inline.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Observes an identity, loading (at least) the requested fields.
    ///
    /// Unknown identities yield a default record for their kind rather
    /// than an error.
    async fn observe(
        &self,
        id: Id,
        kind: IdentityKind,
        fields: &[&str],
    ) -> Result<UserRecord, StoreError>;

    /// Writes a record's changes back.
    async fn flush(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Gating flags for the scope an event arrived in.
    ///
    /// Private conversations have no scope flags.
    async fn channel_flags(&self, event: &MessageEvent) -> Result<ChannelFlags, StoreError>;
}

/// A shared store handle.
pub type BoxedStore = Arc<dyn UserStore>;

/// In-memory [`UserStore`] used by tests and the default runtime wiring.
///
/// Keeps whole records; the field list passed to `observe` is a loading
/// hint for remote stores and is ignored here.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(IdentityKind, Id), UserRecord>>,
    flags: RwLock<HashMap<(IdentityKind, Id), ChannelFlags>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record, e.g. from configuration or a test fixture.
    pub async fn insert_record(&self, record: UserRecord) {
        self.records
            .write()
            .await
            .insert((record.kind, record.id), record);
    }

    /// Sets the gating flags for a group or discuss channel.
    pub async fn set_channel_flags(&self, kind: IdentityKind, id: Id, flags: ChannelFlags) {
        self.flags.write().await.insert((kind, id), flags);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn observe(
        &self,
        id: Id,
        kind: IdentityKind,
        fields: &[&str],
    ) -> Result<UserRecord, StoreError> {
        trace!(id, ?kind, ?fields, "observing record");
        let records = self.records.read().await;
        Ok(records
            .get(&(kind, id))
            .cloned()
            .unwrap_or_else(|| UserRecord::new(id, kind)))
    }

    async fn flush(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut flushed = record.clone();
        flushed.dirty = false;
        self.records
            .write()
            .await
            .insert((record.kind, record.id), flushed);
        Ok(())
    }

    async fn channel_flags(&self, event: &MessageEvent) -> Result<ChannelFlags, StoreError> {
        let flags = self.flags.read().await;
        let looked_up = match event.kind {
            ChatKind::Group => event
                .group
                .and_then(|id| flags.get(&(IdentityKind::Group, id))),
            ChatKind::Discuss => event
                .discuss
                .and_then(|id| flags.get(&(IdentityKind::Discuss, id))),
            ChatKind::Private | ChatKind::Other => None,
        };
        Ok(looked_up.copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_identity_gets_default_record() {
        let store = MemoryStore::new();
        let record = store
            .observe(7, IdentityKind::User, UNIVERSAL_FIELDS)
            .await
            .unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.authority, 0);
        assert!(!record.is_dirty());
    }

    #[tokio::test]
    async fn flush_persists_changes() {
        let store = MemoryStore::new();
        let mut record = store
            .observe(7, IdentityKind::User, UNIVERSAL_FIELDS)
            .await
            .unwrap();
        record.name = Some("alice".into());
        record.mark_dirty();
        store.flush(&record).await.unwrap();

        let reread = store
            .observe(7, IdentityKind::User, UNIVERSAL_FIELDS)
            .await
            .unwrap();
        assert_eq!(reread.name.as_deref(), Some("alice"));
        assert!(!reread.is_dirty());
    }

    #[tokio::test]
    async fn channel_flags_follow_event_origin() {
        let store = MemoryStore::new();
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

        let in_group = MessageEvent::group(1, 42, 100, "x");
        assert!(store.channel_flags(&in_group).await.unwrap().no_response);

        let elsewhere = MessageEvent::group(1, 43, 100, "x");
        assert_eq!(
            store.channel_flags(&elsewhere).await.unwrap(),
            ChannelFlags::default()
        );

        let private = MessageEvent::private(1, 100, "x");
        assert_eq!(
            store.channel_flags(&private).await.unwrap(),
            ChannelFlags::default()
        );
    }

    #[test]
    fn clearing_elapsed_expiry_marks_dirty() {
        let mut record = UserRecord::new(7, IdentityKind::User);
        record.ignore_until = Some(1);
        record.clear_ignore_until();
        assert!(record.ignore_until.is_none());
        assert!(record.is_dirty());

        let mut clean = UserRecord::new(8, IdentityKind::User);
        clean.clear_ignore_until();
        assert!(!clean.is_dirty());
    }
}
