//! In-process state store backed by a lock-protected map and broadcast channels

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use super::{EntryStream, StateStore, StoreEntry, StoreError};

/// Per-key watch buffer. Watchers that fall further behind skip ahead.
const WATCH_BUFFER: usize = 64;

/// Single-process store used for local runs and tests
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
    watchers: DashMap<String, broadcast::Sender<StoreEntry>>,
    revision: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            watchers: DashMap::new(),
            revision: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Latest revision written to any key
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn sender(&self, key: &str) -> broadcast::Sender<StoreEntry> {
        self.watchers
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(WATCH_BUFFER).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        async move {
            self.check_available()?;
            Ok(self.entries.read().get(key).map(|entry| entry.value.clone()))
        }
        .boxed()
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<u64, StoreError>> {
        async move {
            self.check_available()?;
            let sender = self.sender(key);

            // Publish under the write lock so watchers see revisions in order
            let mut entries = self.entries.write();
            let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
            let entry = StoreEntry { value, revision };
            entries.insert(key.to_string(), entry.clone());
            // No receivers is fine
            let _ = sender.send(entry);

            Ok(revision)
        }
        .boxed()
    }

    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<EntryStream, StoreError>> {
        async move {
            self.check_available()?;
            Ok(entry_stream(self.sender(key).subscribe()))
        }
        .boxed()
    }
}

fn entry_stream(rx: broadcast::Receiver<StoreEntry>) -> EntryStream {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(entry) => return Some((entry, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Store watcher lagged, skipping to newer revisions");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
