//! Persistent image records and change subscriptions

mod sqlite;

pub use sqlite::SqliteRecordStore;

use crate::{
    error::Result,
    types::{ImageFile, ImageRecord, RecordId},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Callback receiving the full record list, most recent first
pub type StoreListener = Box<dyn Fn(&[ImageRecord]) + Send + Sync>;

/// Handle returned by [`RecordStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Storage for image records
///
/// Records are ordered by id; "most recent first" means descending id.
/// Every successful mutation notifies subscribers with the new full list.
pub trait RecordStore: Send + Sync {
    /// Persist a new pending record and return its id
    ///
    /// # Errors
    /// - `Store` when the write fails
    fn insert(&self, source: ImageFile) -> Result<RecordId>;

    /// # Errors
    /// - `Store` when the read fails
    fn get(&self, id: RecordId) -> Result<Option<ImageRecord>>;

    /// Records without a processed image, most recent first
    ///
    /// # Errors
    /// - `Store` when the read fails
    fn pending_most_recent_first(&self) -> Result<Vec<ImageRecord>>;

    /// Every record, most recent first
    ///
    /// # Errors
    /// - `Store` when the read fails
    fn list_most_recent_first(&self) -> Result<Vec<ImageRecord>>;

    /// Attach the processed image to a pending record
    ///
    /// # Errors
    /// - `Store` when the record does not exist, is already processed, or
    ///   the write fails
    fn set_processed(&self, id: RecordId, processed: ImageFile) -> Result<()>;

    /// Remove one record; returns whether it existed
    ///
    /// # Errors
    /// - `Store` when the write fails
    fn delete(&self, id: RecordId) -> Result<bool>;

    /// Remove every record; returns how many were removed
    ///
    /// # Errors
    /// - `Store` when the write fails
    fn clear(&self) -> Result<usize>;

    fn subscribe(&self, listener: StoreListener) -> SubscriptionId;

    /// Returns whether the subscription existed
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Subscriber bookkeeping shared by store implementations
///
/// Listeners are called outside the registry lock, so a callback may
/// subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn Fn(&[ImageRecord]) + Send + Sync>)>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: StoreListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, Arc::from(listener)));
        }
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `records`
    pub fn notify(&self, records: &[ImageRecord]) {
        let snapshot: Vec<_> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(records);
        }
    }
}
