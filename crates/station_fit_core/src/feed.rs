//! crates/station_fit_core/src/feed.rs
//!
//! In-process change fan-out shared by the store adapters. Every committed write
//! announces the collection it touched; each standing query re-reads its collection
//! and yields a complete result set.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::document::{CollectionPath, Document, Query, Snapshot};
use crate::ports::{PortResult, SnapshotStream};

/// Broadcasts the collection path of every committed write.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<CollectionPath>,
    listeners: Arc<AtomicUsize>,
}

/// Decrements the live listener count when a stream is dropped.
struct ListenerGuard(Arc<AtomicUsize>);

impl ListenerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            listeners: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn notify(&self, collection: &CollectionPath) {
        // No receivers simply means nobody is listening.
        let _ = self.tx.send(collection.clone());
    }

    /// Number of standing queries that have not been dropped yet.
    pub fn active_listeners(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    /// Turns a collection read into a standing query.
    ///
    /// `fetch` is called once up front and again after every change to the query's
    /// collection. A lagging receiver re-reads once instead of replaying every change.
    pub fn listen<F, Fut>(&self, query: Query, fetch: F) -> SnapshotStream
    where
        F: Fn(Query) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PortResult<Vec<Document>>> + Send + 'static,
    {
        // Subscribe before the first read so no change can slip in between.
        let mut rx = self.tx.subscribe();
        let guard = ListenerGuard::new(self.listeners.clone());

        Box::pin(async_stream::stream! {
            let _guard = guard;
            yield fetch(query.clone()).await.map(snapshot);
            loop {
                match rx.recv().await {
                    Ok(changed) if changed == query.collection => {
                        debug!(collection = %changed, "Collection changed, re-reading snapshot");
                        yield fetch(query.clone()).await.map(snapshot);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, collection = %query.collection, "Listener lagged behind the change feed");
                        yield fetch(query.clone()).await.map(snapshot);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

fn snapshot(docs: Vec<Document>) -> Snapshot {
    Snapshot {
        docs,
        read_time: Utc::now(),
    }
}
