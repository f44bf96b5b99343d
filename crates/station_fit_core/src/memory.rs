//! crates/station_fit_core/src/memory.rs
//!
//! An in-memory implementation of the store ports. It backs the `memory` store
//! backend of the service and every test in the workspace. It counts writes and live
//! listeners, and can be told to reject writes, so callers can observe exactly what
//! reached the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{
    merge_fields, CollectionPath, DocPath, Document, Fields, IndexSet, Query, SetMode, WriteOp,
};
use crate::domain::UserCredentials;
use crate::feed::ChangeFeed;
use crate::ports::{CredentialStore, DocumentStore, PortError, PortResult, SnapshotStream};

type DocMap = BTreeMap<DocPath, Document>;

pub struct MemoryStore {
    docs: Arc<RwLock<DocMap>>,
    indexes: IndexSet,
    feed: ChangeFeed,
    write_calls: AtomicU64,
    write_failure: Mutex<Option<PortError>>,
    users: Mutex<HashMap<String, UserCredentials>>,
    auth_sessions: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(IndexSet::new())
    }
}

impl MemoryStore {
    pub fn new(indexes: IndexSet) -> Self {
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            indexes,
            feed: ChangeFeed::default(),
            write_calls: AtomicU64::new(0),
            write_failure: Mutex::new(None),
            users: Mutex::new(HashMap::new()),
            auth_sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of write calls that reached the store, failed ones included.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn active_listeners(&self) -> usize {
        self.feed.active_listeners()
    }

    /// Makes every following write fail with `error` until cleared with `None`.
    pub fn set_write_failure(&self, error: Option<PortError>) {
        if let Ok(mut slot) = self.write_failure.lock() {
            *slot = error;
        }
    }

    fn begin_write(&self) -> PortResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        match self.write_failure.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
            Err(_) => Err(PortError::Unexpected("store lock poisoned".to_string())),
        }
    }
}

fn check_doc_path(path: &DocPath) -> PortResult<()> {
    if path.is_well_formed() {
        Ok(())
    } else {
        Err(PortError::Invalid(format!("'{}' is not a document path", path)))
    }
}

fn apply_op(docs: &mut DocMap, op: WriteOp, now: DateTime<Utc>) {
    match op {
        WriteOp::Set { path, fields, mode } => {
            let entry = docs.entry(path.clone()).or_insert_with(|| Document {
                path,
                fields: Fields::new(),
                update_time: now,
            });
            match mode {
                SetMode::Merge => merge_fields(&mut entry.fields, fields),
                SetMode::Overwrite => entry.fields = fields,
            }
            entry.update_time = now;
        }
        WriteOp::Delete { path } => {
            docs.remove(&path);
        }
    }
}

fn read_collection(docs: &DocMap, query: &Query) -> Vec<Document> {
    let listing = docs
        .values()
        .filter(|d| d.path.collection() == query.collection)
        .cloned();
    query.apply(listing)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> PortResult<Option<Document>> {
        check_doc_path(path)?;
        Ok(self.docs.read().await.get(path).cloned())
    }

    async fn run_query(&self, query: &Query) -> PortResult<Vec<Document>> {
        self.indexes.check(query)?;
        Ok(read_collection(&*self.docs.read().await, query))
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> PortResult<()> {
        check_doc_path(path)?;
        self.begin_write()?;
        let op = WriteOp::Set {
            path: path.clone(),
            fields,
            mode,
        };
        apply_op(&mut *self.docs.write().await, op, Utc::now());
        self.feed.notify(&path.collection());
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> PortResult<DocPath> {
        let path = collection.doc(&Uuid::new_v4().simple().to_string());
        self.set(&path, fields, SetMode::Overwrite).await?;
        Ok(path)
    }

    async fn delete(&self, path: &DocPath) -> PortResult<()> {
        check_doc_path(path)?;
        self.begin_write()?;
        self.docs.write().await.remove(path);
        self.feed.notify(&path.collection());
        Ok(())
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        for op in &ops {
            check_doc_path(op.path())?;
        }
        self.begin_write()?;
        let touched: BTreeSet<CollectionPath> = ops.iter().map(|op| op.path().collection()).collect();
        let now = Utc::now();
        {
            let mut docs = self.docs.write().await;
            for op in ops {
                apply_op(&mut docs, op, now);
            }
        }
        for collection in &touched {
            self.feed.notify(collection);
        }
        Ok(())
    }

    async fn swap_field(&self, a: &DocPath, b: &DocPath, field: &str) -> PortResult<()> {
        check_doc_path(a)?;
        check_doc_path(b)?;
        self.begin_write()?;
        {
            let mut docs = self.docs.write().await;
            let value_a = docs
                .get(a)
                .ok_or_else(|| PortError::NotFound(a.to_string()))?
                .fields
                .get(field)
                .cloned();
            let value_b = docs
                .get(b)
                .ok_or_else(|| PortError::NotFound(b.to_string()))?
                .fields
                .get(field)
                .cloned();
            let now = Utc::now();
            for (path, value) in [(a, value_b), (b, value_a)] {
                if let Some(doc) = docs.get_mut(path) {
                    match value {
                        Some(v) => doc.fields.insert(field.to_string(), v),
                        None => doc.fields.remove(field),
                    };
                    doc.update_time = now;
                }
            }
        }
        self.feed.notify(&a.collection());
        if b.collection() != a.collection() {
            self.feed.notify(&b.collection());
        }
        Ok(())
    }

    async fn listen(&self, query: &Query) -> PortResult<SnapshotStream> {
        self.indexes.check(query)?;
        let docs = self.docs.clone();
        Ok(self.feed.listen(query.clone(), move |q| {
            let docs = docs.clone();
            async move { Ok(read_collection(&*docs.read().await, &q)) }
        }))
    }
}

fn lock_error<T>(_: T) -> PortError {
    PortError::Unexpected("credential lock poisoned".to_string())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials> {
        let mut users = self.users.lock().map_err(lock_error)?;
        let key = email.trim().to_ascii_lowercase();
        if users.contains_key(&key) {
            return Err(PortError::Invalid(format!("{} is already registered", email)));
        }
        let creds = UserCredentials {
            user_id: Uuid::new_v4(),
            email: key.clone(),
            hashed_password: hashed_password.to_string(),
        };
        users.insert(key, creds.clone());
        Ok(creds)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let users = self.users.lock().map_err(lock_error)?;
        users
            .get(&email.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let users = self.users.lock().map_err(lock_error)?;
        users
            .values()
            .find(|u| u.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut sessions = self.auth_sessions.lock().map_err(lock_error)?;
        sessions.insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let sessions = self.auth_sessions.lock().map_err(lock_error)?;
        match sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut sessions = self.auth_sessions.lock().map_err(lock_error)?;
        sessions.remove(session_id);
        Ok(())
    }
}
