//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `DocumentStore` and `CredentialStore` ports from the core crate. Documents are
//! rows of one JSONB table keyed by path; filtering and ordering of a collection
//! happen in the core query model after the rows are loaded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use station_fit_core::document::{
    merge_fields, CollectionPath, DocPath, Document, Fields, IndexSet, Query, SetMode, WriteOp,
};
use station_fit_core::domain::UserCredentials;
use station_fit_core::feed::ChangeFeed;
use station_fit_core::ports::{CredentialStore, DocumentStore, PortError, PortResult, SnapshotStream};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports on PostgreSQL.
///
/// Live queries are fed by an in-process change feed, so every writer has to go
/// through the same adapter instance.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    feed: ChangeFeed,
    indexes: IndexSet,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool, indexes: IndexSet) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
            indexes,
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn active_listeners(&self) -> usize {
        self.feed.active_listeners()
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn check_doc_path(path: &DocPath) -> PortResult<()> {
    if path.is_well_formed() {
        Ok(())
    } else {
        Err(PortError::Invalid(format!("'{}' is not a document path", path)))
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    path: String,
    fields: Json<Fields>,
    update_time: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        Ok(Document {
            path: DocPath::parse(&self.path)?,
            fields: self.fields.0,
            update_time: self.update_time,
        })
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

//=========================================================================================
// Row-level helpers shared by single writes and batches
//=========================================================================================

async fn read_collection(pool: &PgPool, query: &Query) -> PortResult<Vec<Document>> {
    let records = sqlx::query_as::<_, DocumentRecord>(
        "SELECT path, fields, update_time FROM documents WHERE collection = $1",
    )
    .bind(query.collection.as_str())
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    let docs = records
        .into_iter()
        .map(DocumentRecord::to_domain)
        .collect::<PortResult<Vec<_>>>()?;
    Ok(query.apply(docs))
}

/// Locks the row at `path` for the rest of the transaction, inserting an empty
/// row first when none exists so concurrent merges into a new document queue up.
async fn lock_fields(conn: &mut PgConnection, path: &DocPath) -> PortResult<Fields> {
    sqlx::query(
        "INSERT INTO documents (path, collection, fields, update_time) VALUES ($1, $2, '{}'::jsonb, now()) \
         ON CONFLICT (path) DO NOTHING",
    )
    .bind(path.as_str())
    .bind(path.collection().as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    let row = sqlx::query_scalar::<_, Json<Fields>>(
        "SELECT fields FROM documents WHERE path = $1 FOR UPDATE",
    )
    .bind(path.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(row.map(|json| json.0).unwrap_or_default())
}

async fn upsert(conn: &mut PgConnection, path: &DocPath, fields: &Fields) -> PortResult<()> {
    sqlx::query(
        "INSERT INTO documents (path, collection, fields, update_time) VALUES ($1, $2, $3, now()) \
         ON CONFLICT (path) DO UPDATE SET fields = EXCLUDED.fields, update_time = now()",
    )
    .bind(path.as_str())
    .bind(path.collection().as_str())
    .bind(Json(fields))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn apply_op(conn: &mut PgConnection, op: WriteOp) -> PortResult<()> {
    match op {
        WriteOp::Set { path, fields, mode } => {
            let next = match mode {
                SetMode::Overwrite => fields,
                SetMode::Merge => {
                    let mut existing = lock_fields(&mut *conn, &path).await?;
                    merge_fields(&mut existing, fields);
                    existing
                }
            };
            upsert(&mut *conn, &path, &next).await
        }
        WriteOp::Delete { path } => {
            sqlx::query("DELETE FROM documents WHERE path = $1")
                .bind(path.as_str())
                .execute(&mut *conn)
                .await
                .map_err(db_error)?;
            Ok(())
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn get(&self, path: &DocPath) -> PortResult<Option<Document>> {
        check_doc_path(path)?;
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT path, fields, update_time FROM documents WHERE path = $1",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        record.map(DocumentRecord::to_domain).transpose()
    }

    async fn run_query(&self, query: &Query) -> PortResult<Vec<Document>> {
        self.indexes.check(query)?;
        read_collection(&self.pool, query).await
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> PortResult<()> {
        self.commit_batch(vec![WriteOp::Set {
            path: path.clone(),
            fields,
            mode,
        }])
        .await
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> PortResult<DocPath> {
        let path = collection.doc(&Uuid::new_v4().simple().to_string());
        self.set(&path, fields, SetMode::Overwrite).await?;
        Ok(path)
    }

    async fn delete(&self, path: &DocPath) -> PortResult<()> {
        self.commit_batch(vec![WriteOp::Delete { path: path.clone() }]).await
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        for op in &ops {
            check_doc_path(op.path())?;
        }
        let touched: BTreeSet<CollectionPath> = ops.iter().map(|op| op.path().collection()).collect();
        let count = ops.len();

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for op in ops {
            apply_op(&mut tx, op).await?;
        }
        tx.commit().await.map_err(db_error)?;
        debug!(count, "Committed document writes");

        for collection in &touched {
            self.feed.notify(collection);
        }
        Ok(())
    }

    async fn swap_field(&self, a: &DocPath, b: &DocPath, field: &str) -> PortResult<()> {
        check_doc_path(a)?;
        check_doc_path(b)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut fields_a = lock_fields(&mut tx, a)
            .await?
            .ok_or_else(|| PortError::NotFound(a.to_string()))?;
        let mut fields_b = lock_fields(&mut tx, b)
            .await?
            .ok_or_else(|| PortError::NotFound(b.to_string()))?;

        let value_a = fields_a.remove(field);
        let value_b = fields_b.remove(field);
        if let Some(v) = value_b {
            fields_a.insert(field.to_string(), v);
        }
        if let Some(v) = value_a {
            fields_b.insert(field.to_string(), v);
        }
        upsert(&mut tx, a, &fields_a).await?;
        upsert(&mut tx, b, &fields_b).await?;
        tx.commit().await.map_err(db_error)?;

        self.feed.notify(&a.collection());
        if b.collection() != a.collection() {
            self.feed.notify(&b.collection());
        }
        Ok(())
    }

    async fn listen(&self, query: &Query) -> PortResult<SnapshotStream> {
        self.indexes.check(query)?;
        let pool = self.pool.clone();
        info!(collection = %query.collection, "Opening live query");
        Ok(self.feed.listen(query.clone(), move |q| {
            let pool = pool.clone();
            async move { read_collection(&pool, &q).await }
        }))
    }
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email, hashed_password",
        )
        .bind(Uuid::new_v4())
        .bind(email.trim().to_ascii_lowercase())
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .map_or(false, |db| db.is_unique_violation());
            if duplicate {
                PortError::Invalid(format!("{} is already registered", email))
            } else {
                db_error(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email.trim().to_ascii_lowercase())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => db_error(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => db_error(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use station_fit_core::document::paths;

    /// Connects to `TEST_DATABASE_URL`, or `None` to skip when no database is configured.
    async fn test_adapter() -> Option<DbAdapter> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.unwrap();
        let adapter = DbAdapter::new(pool, IndexSet::new());
        adapter.run_migrations().await.unwrap();
        Some(adapter)
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn concurrent_merges_into_a_new_document_keep_both_fields() {
        let Some(db) = test_adapter().await else {
            return;
        };
        for _ in 0..10 {
            let path = paths::settings(&Uuid::new_v4().simple().to_string());
            let (a, b) = tokio::join!(
                db.set(&path, fields(json!({"a": 1})), SetMode::Merge),
                db.set(&path, fields(json!({"b": 2})), SetMode::Merge),
            );
            a.unwrap();
            b.unwrap();
            let doc = db.get(&path).await.unwrap().unwrap();
            assert_eq!(doc.fields.get("a"), Some(&json!(1)));
            assert_eq!(doc.fields.get("b"), Some(&json!(2)));
            db.delete(&path).await.unwrap();
        }
    }

    #[tokio::test]
    async fn merge_keeps_nested_fields_of_an_existing_document() {
        let Some(db) = test_adapter().await else {
            return;
        };
        let path = paths::settings(&Uuid::new_v4().simple().to_string());
        db.set(&path, fields(json!({"theme": {"color": "red"}, "n": 1})), SetMode::Overwrite)
            .await
            .unwrap();
        db.set(&path, fields(json!({"theme": {"size": 2}})), SetMode::Merge)
            .await
            .unwrap();
        let doc = db.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.fields.get("theme"), Some(&json!({"color": "red", "size": 2})));
        assert_eq!(doc.fields.get("n"), Some(&json!(1)));
        db.delete(&path).await.unwrap();
    }
}
