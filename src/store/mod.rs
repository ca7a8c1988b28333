//! State store abstraction: a key-value channel holding the world snapshot
//!
//! The world state travels as a single JSON blob under one key. Writers `put`
//! it, readers `get` it, and every interested task can `watch` the key for
//! new revisions.

pub mod memory;
pub mod nats;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

pub use memory::MemoryStore;
pub use nats::NatsKvStore;

/// Default bucket name for the key-value backend
pub const DEFAULT_BUCKET: &str = "gamestate";
/// Key under which the world snapshot is stored
pub const SNAPSHOT_KEY: &str = "current";

/// One revision of a key
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub value: Bytes,
    pub revision: u64,
}

/// Stream of updates for a watched key
pub type EntryStream = BoxStream<'static, StoreEntry>;

/// A key-value store with change notification.
///
/// `watch` only yields revisions written after the call. A slow watcher may
/// skip intermediate revisions but always converges on the newest one.
pub trait StateStore: Send + Sync {
    /// Fetch the current value of a key
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>>;

    /// Write a value, returning the new revision
    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Subscribe to future writes of a key
    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<EntryStream, StoreError>>;
}

/// State store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State store unavailable")]
    Unavailable,

    #[error("State store backend error: {0}")]
    Backend(String),
}
