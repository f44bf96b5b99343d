//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-caller views of it.

use crate::config::Config;
use crate::web::rules::{Caller, GuardedStore};
use station_fit_core::gateway::MutationGateway;
use station_fit_core::ports::{CredentialStore, DocumentStore};
use station_fit_core::session::{Session, SessionResolver};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Unrestricted store. Handlers only reach it through `store_for`.
    pub store: Arc<dyn DocumentStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// The store as seen by `caller`: every write is checked against the rules.
    pub fn store_for(&self, caller: Caller) -> Arc<dyn DocumentStore> {
        Arc::new(GuardedStore::new(self.store.clone(), caller))
    }

    pub fn resolver_for(&self, uid: &str) -> SessionResolver {
        SessionResolver::new(self.store_for(Caller::member(uid)))
    }

    pub fn gateway(&self, session: &Session) -> MutationGateway {
        MutationGateway::new(self.store_for(Caller::from(session)), session.clone())
    }
}
