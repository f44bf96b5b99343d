//! crates/station_fit_core/src/session.rs
//!
//! Resolves the signed-in identity to its profile. The resulting `Session` is an
//! explicit value handed to every page and gateway.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::document::{paths, Fields, Query, SetMode};
use crate::domain::{FromDocument, Identity, Profile, Role};
use crate::live::LiveCollection;
use crate::ports::{DocumentStore, PortError, PortResult};

/// What pages see while the session is being resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: false,
            error: None,
        }
    }

    /// The usable session, once both identity and profile are known.
    pub fn session(&self) -> Option<Session> {
        match (&self.identity, &self.profile) {
            (Some(identity), Some(profile)) => Some(Session {
                identity: identity.clone(),
                profile: profile.clone(),
            }),
            _ => None,
        }
    }
}

/// A resolved, signed-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub profile: Profile,
}

impl Session {
    pub fn uid(&self) -> &str {
        &self.identity.uid
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }

    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }
}

pub struct SessionResolver {
    store: Arc<dyn DocumentStore>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Loads the profile for `identity`, creating it on first sign-in.
    ///
    /// Failures leave the state loading with an error instead of propagating.
    pub async fn resolve(&self, identity: Option<Identity>) -> SessionState {
        let Some(identity) = identity else {
            return SessionState::signed_out();
        };
        match self.load_or_create(&identity).await {
            Ok(profile) => SessionState {
                identity: Some(identity),
                profile: Some(profile),
                loading: false,
                error: None,
            },
            Err(e) => {
                error!(uid = %identity.uid, "Failed to resolve session: {}", e);
                SessionState {
                    identity: Some(identity),
                    profile: None,
                    loading: true,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn load_or_create(&self, identity: &Identity) -> PortResult<Profile> {
        let path = paths::profile(&identity.uid);
        if let Some(doc) = self.store.get(&path).await? {
            return Profile::from_document(&doc);
        }

        let now = Utc::now();
        let display_name = identity
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                identity
                    .email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Member".to_string());
        let fields = match json!({
            "displayName": display_name,
            "email": identity.email,
            "role": Role::Member,
            "createdAt": now,
            "updatedAt": now,
        }) {
            serde_json::Value::Object(map) => map,
            _ => Fields::new(),
        };
        // Merge so a profile written concurrently by another tab keeps its fields.
        self.store.set(&path, fields, SetMode::Merge).await?;
        info!(uid = %identity.uid, "Created profile on first sign-in");

        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| PortError::NotFound(path.to_string()))?;
        Profile::from_document(&doc)
    }

    /// Keeps the profile current so role changes apply without signing in again.
    pub async fn watch(&self, identity: &Identity) -> PortResult<LiveCollection<Option<Profile>>> {
        let uid = identity.uid.clone();
        LiveCollection::open(
            self.store.clone(),
            Query::new(paths::profiles()),
            None,
            move |profiles: Vec<Profile>| profiles.into_iter().find(|p| p.id == uid),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: Some(format!("{}@station1.org", uid)),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn first_sign_in_creates_member_profile_once() {
        let store = Arc::new(MemoryStore::default());
        let resolver = SessionResolver::new(store.clone());

        let state = resolver.resolve(Some(identity("jordan"))).await;
        let session = state.session().unwrap();
        assert_eq!(session.role(), Role::Member);
        assert_eq!(session.display_name(), "jordan");
        assert_eq!(store.write_calls(), 1);

        resolver.resolve(Some(identity("jordan"))).await;
        assert_eq!(store.write_calls(), 1);
    }

    #[tokio::test]
    async fn signed_out_and_failures_do_not_escalate() {
        let store = Arc::new(MemoryStore::default());
        let resolver = SessionResolver::new(store.clone());
        let state = resolver.resolve(None).await;
        assert!(state.session().is_none());
        assert!(!state.loading);

        store.set_write_failure(Some(PortError::Unavailable("offline".into())));
        let state = resolver.resolve(Some(identity("riley"))).await;
        assert!(state.loading);
        assert!(state.session().is_none());
        assert!(state.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn role_changes_reach_the_watcher() {
        let store = Arc::new(MemoryStore::default());
        let resolver = SessionResolver::new(store.clone());
        let who = identity("alex");
        resolver.resolve(Some(who.clone())).await;

        let mut live = resolver.watch(&who).await.unwrap();
        let first = live.wait_for(|s| !s.loading).await.unwrap();
        assert_eq!(first.view.flatten().unwrap().role, Role::Member);

        let mut promote = Fields::new();
        promote.insert("role".into(), "mentor".into());
        store.set(&paths::profile("alex"), promote, SetMode::Merge).await.unwrap();

        let next = live.changed().await.unwrap();
        assert_eq!(next.view.flatten().unwrap().role, Role::Mentor);
    }
}
