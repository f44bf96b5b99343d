//! crates/station_fit_core/src/live.rs
//!
//! The live aggregated collection: one standing query, decoded into record types,
//! aggregated into a view model, and published through a `watch` channel on every
//! snapshot. Pages open one of these per view instead of repeating the cycle.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::document::{Document, Query};
use crate::domain::FromDocument;
use crate::ports::{DocumentStore, PortError, PortResult};

/// How the store served a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPlan {
    /// The store evaluated filters and ordering itself.
    Indexed,
    /// The store evaluated filters only; ordering was applied here.
    ClientSorted,
}

/// What a page renders: the last good view plus the current error banner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState<V> {
    pub view: Option<V>,
    pub error: Option<String>,
    pub loading: bool,
    pub plan: QueryPlan,
    pub used_fallback: bool,
}

impl<V> ViewState<V> {
    fn loading(plan: QueryPlan) -> Self {
        Self {
            view: None,
            error: None,
            loading: true,
            plan,
            used_fallback: false,
        }
    }
}

/// Decodes every document, skipping (and logging) the ones that fail.
pub fn decode_all<T: FromDocument>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %doc.path, "Skipping undecodable document: {}", e);
                None
            }
        })
        .collect()
}

/// Puts a client-side plan's result set into the query's order.
fn order_locally(query: &Query, mut docs: Vec<Document>) -> Vec<Document> {
    query.sort(&mut docs);
    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }
    docs
}

/// Runs a one-shot query, retrying without ordering when an index is missing.
pub async fn fetch_ordered(
    store: &dyn DocumentStore,
    query: &Query,
) -> PortResult<(Vec<Document>, QueryPlan)> {
    match store.run_query(query).await {
        Ok(docs) => Ok((docs, QueryPlan::Indexed)),
        Err(PortError::MissingIndex(index)) => {
            warn!(index = %index, "Index missing, sorting on the client instead");
            let docs = store.run_query(&query.without_ordering()).await?;
            Ok((order_locally(query, docs), QueryPlan::ClientSorted))
        }
        Err(e) => Err(e),
    }
}

/// Decodes a result set, substitutes the fallback rows when it is empty, and aggregates.
pub fn derive_view<T, V, A>(docs: &[Document], fallback: Option<&[T]>, aggregate: &A) -> (V, bool)
where
    T: FromDocument + Clone,
    A: Fn(Vec<T>) -> V,
{
    let rows: Vec<T> = decode_all(docs);
    match fallback {
        Some(fallback) if rows.is_empty() => (aggregate(fallback.to_vec()), true),
        _ => (aggregate(rows), false),
    }
}

/// One-shot read with the same plan and fallback rules as a live view.
pub async fn read_view<T, V, A>(
    store: &dyn DocumentStore,
    query: &Query,
    fallback: Option<&[T]>,
    aggregate: A,
) -> PortResult<ViewState<V>>
where
    T: FromDocument + Clone,
    A: Fn(Vec<T>) -> V,
{
    let (docs, plan) = fetch_ordered(store, query).await?;
    let (view, used_fallback) = derive_view(&docs, fallback, &aggregate);
    Ok(ViewState {
        view: Some(view),
        error: None,
        loading: false,
        plan,
        used_fallback,
    })
}

/// A standing query whose aggregated view is kept current in the background.
///
/// Dropping the value stops the background task and releases the store listener.
pub struct LiveCollection<V> {
    state: watch::Receiver<ViewState<V>>,
    task: JoinHandle<()>,
}

impl<V> LiveCollection<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub async fn open<T, A>(
        store: Arc<dyn DocumentStore>,
        query: Query,
        fallback: Option<Vec<T>>,
        aggregate: A,
    ) -> PortResult<Self>
    where
        T: FromDocument + Clone + Send + Sync + 'static,
        A: Fn(Vec<T>) -> V + Send + Sync + 'static,
    {
        let (mut stream, plan) = match store.listen(&query).await {
            Ok(stream) => (stream, QueryPlan::Indexed),
            Err(PortError::MissingIndex(index)) => {
                warn!(index = %index, "Index missing, listening without ordering");
                (store.listen(&query.without_ordering()).await?, QueryPlan::ClientSorted)
            }
            Err(e) => return Err(e),
        };
        info!(collection = %query.collection, ?plan, "Live collection opened");

        let (tx, rx) = watch::channel(ViewState::loading(plan));
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(snapshot) => {
                        let docs = match plan {
                            QueryPlan::Indexed => snapshot.docs,
                            QueryPlan::ClientSorted => order_locally(&query, snapshot.docs),
                        };
                        let (view, used_fallback) = derive_view(&docs, fallback.as_deref(), &aggregate);
                        debug!(collection = %query.collection, docs = docs.len(), "Snapshot aggregated");
                        tx.send_replace(ViewState {
                            view: Some(view),
                            error: None,
                            loading: false,
                            plan,
                            used_fallback,
                        });
                    }
                    Err(e) => {
                        warn!(collection = %query.collection, "Live query failed: {}", e);
                        tx.send_modify(|state| {
                            state.error = Some(e.to_string());
                            state.loading = false;
                        });
                    }
                }
            }
            debug!(collection = %query.collection, "Live query ended");
        });

        Ok(Self { state: rx, task })
    }

    /// The latest state without waiting.
    pub fn current(&self) -> ViewState<V> {
        ViewState::clone(&self.state.borrow())
    }

    /// Waits for the next published state. `None` once the listener has ended.
    pub async fn changed(&mut self) -> Option<ViewState<V>> {
        self.state.changed().await.ok()?;
        Some(ViewState::clone(&self.state.borrow_and_update()))
    }

    /// Waits until a state satisfies `ready`, e.g. the first loaded snapshot.
    pub async fn wait_for(&mut self, ready: impl Fn(&ViewState<V>) -> bool) -> Option<ViewState<V>> {
        let state = self.state.wait_for(|s| ready(s)).await.ok()?;
        Some(ViewState::clone(&state))
    }
}

impl<V> Drop for LiveCollection<V> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::sort_standards;
    use crate::document::{paths, Direction, IndexSet, SetMode};
    use crate::domain::{Standard, Tier};
    use crate::fallback::fallback_standards;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn titles(mut standards: Vec<Standard>) -> Vec<String> {
        sort_standards(&mut standards);
        standards.into_iter().map(|s| s.title).collect()
    }

    fn elite_query() -> Query {
        Query::new(paths::standards())
            .where_eq("tier", "elite")
            .order_by("order", Direction::Asc)
    }

    async fn put(store: &MemoryStore, id: &str, fields: serde_json::Value) {
        store
            .set(&paths::standard(id), fields.as_object().cloned().unwrap(), SetMode::Overwrite)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_collection_renders_fallback() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::default());
        let fallback = fallback_standards(Tier::Elite);
        let mut live = LiveCollection::open(store, elite_query(), Some(fallback.clone()), titles)
            .await
            .unwrap();
        let state = live.wait_for(|s| !s.loading).await.unwrap();
        assert!(state.used_fallback);
        assert_eq!(state.view.unwrap(), titles(fallback));
        assert_eq!(state.plan, QueryPlan::ClientSorted);
    }

    #[tokio::test]
    async fn missing_index_falls_back_to_client_sort() {
        let store = Arc::new(MemoryStore::default());
        put(&store, "b", json!({"title": "Second", "tier": "elite", "order": 2})).await;
        put(&store, "a", json!({"title": "First", "tier": "elite", "order": 1})).await;
        put(&store, "c", json!({"title": "Other", "tier": "committed", "order": 0})).await;

        let ids = |standards: Vec<Standard>| standards.into_iter().map(|s| s.id).collect::<Vec<_>>();
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        let mut live = LiveCollection::open(dyn_store, elite_query(), None, ids).await.unwrap();
        let state = live.wait_for(|s| !s.loading).await.unwrap();
        assert_eq!(state.plan, QueryPlan::ClientSorted);
        assert_eq!(state.view.unwrap(), vec!["a", "b"]);

        put(&store, "d", json!({"title": "Zeroth", "tier": "elite", "order": 0})).await;
        let state = live.changed().await.unwrap();
        assert_eq!(state.view.unwrap(), vec!["d", "a", "b"]);
    }

    #[tokio::test]
    async fn declared_index_is_used_directly() {
        let store: Arc<dyn DocumentStore> =
            Arc::new(MemoryStore::new(IndexSet::new().declare(&elite_query())));
        let (_, plan) = fetch_ordered(store.as_ref(), &elite_query()).await.unwrap();
        assert_eq!(plan, QueryPlan::Indexed);
    }

    #[tokio::test]
    async fn dropping_the_view_releases_the_listener() {
        let store = Arc::new(MemoryStore::default());
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        let live = LiveCollection::open(dyn_store, Query::new(paths::messages()), None, |rows: Vec<crate::domain::Message>| rows.len())
            .await
            .unwrap();
        assert_eq!(store.active_listeners(), 1);
        drop(live);

        for _ in 0..50 {
            if store.active_listeners() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.active_listeners(), 0);
    }

    #[tokio::test]
    async fn one_shot_read_uses_fallback_too() {
        let store = MemoryStore::default();
        let fallback = fallback_standards(Tier::Committed);
        let state = read_view(&store, &Query::new(paths::standards()), Some(&fallback[..]), |rows: Vec<Standard>| rows.len())
            .await
            .unwrap();
        assert!(state.used_fallback);
        assert_eq!(state.view, Some(fallback.len()));
    }
}
