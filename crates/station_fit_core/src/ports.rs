//! crates/station_fit_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document backend and credential storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::document::{CollectionPath, DocPath, Document, Fields, Query, SetMode, Snapshot, WriteOp};
use crate::domain::UserCredentials;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Rejected by the backend's authorization rules. The message is shown verbatim.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The backend could not be reached or dropped the request.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// The query needs a composite index the backend does not have yet.
    #[error("The query requires an index: {0}")]
    MissingIndex(String),
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Live result sets of a standing query. Dropping the stream releases the listener.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = PortResult<Snapshot>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> PortResult<Option<Document>>;

    async fn run_query(&self, query: &Query) -> PortResult<Vec<Document>>;

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> PortResult<()>;

    /// Creates a document with a generated id and returns its path.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> PortResult<DocPath>;

    async fn delete(&self, path: &DocPath) -> PortResult<()>;

    /// Applies every write or none of them.
    async fn commit_batch(&self, ops: Vec<WriteOp>) -> PortResult<()>;

    /// Atomically exchanges the value of `field` between two existing documents.
    async fn swap_field(&self, a: &DocPath, b: &DocPath, field: &str) -> PortResult<()>;

    /// Opens a standing query. The first item is the current result set; a new full
    /// result set follows every change to the queried collection.
    async fn listen(&self, query: &Query) -> PortResult<SnapshotStream>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owner of a live, unexpired auth session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}
