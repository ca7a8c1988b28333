//! JetStream key-value backend

use async_nats::jetstream::{self, kv};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tracing::{info, warn};

use super::{EntryStream, StateStore, StoreEntry, StoreError};

/// State store backed by a JetStream KV bucket
pub struct NatsKvStore {
    bucket: kv::Store,
    bucket_name: String,
}

impl NatsKvStore {
    /// Connect to NATS and create (or open) the bucket
    pub async fn connect(url: &str, bucket: &str) -> Result<Self, StoreError> {
        info!(url, bucket, "Connecting to NATS key-value store");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect failed: {}", e)))?;
        let jetstream = jetstream::new(client);

        let store = jetstream
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                history: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::Backend(format!("bucket setup failed: {}", e)))?;

        info!(bucket, "Key-value bucket ready");

        Ok(Self {
            bucket: store,
            bucket_name: bucket.to_string(),
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

impl StateStore for NatsKvStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        async move {
            self.bucket
                .get(key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
        .boxed()
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<u64, StoreError>> {
        async move {
            self.bucket
                .put(key, value)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
        .boxed()
    }

    fn watch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<EntryStream, StoreError>> {
        async move {
            let watch = self
                .bucket
                .watch(key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            let entries = watch.filter_map(|result| async move {
                match result {
                    Ok(entry) if entry.operation == kv::Operation::Put => Some(StoreEntry {
                        value: entry.value,
                        revision: entry.revision,
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "Key-value watch error");
                        None
                    }
                }
            });

            Ok(entries.boxed())
        }
        .boxed()
    }
}
