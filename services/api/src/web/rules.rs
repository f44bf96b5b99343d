//! services/api/src/web/rules.rs
//!
//! Backend authorization rules. Every document write made on behalf of a caller is
//! checked here, independently of the role gate in the mutation gateway. Reads are
//! open to any signed-in caller.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use station_fit_core::document::{merge_fields, CollectionPath, DocPath, Document, Fields, Query, SetMode, WriteOp};
use station_fit_core::domain::Role;
use station_fit_core::ports::{DocumentStore, PortError, PortResult, SnapshotStream};
use station_fit_core::session::Session;

/// Who a write is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
    pub role: Role,
}

impl Caller {
    /// A caller whose profile has not been loaded yet.
    pub fn member(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: Role::Member,
        }
    }
}

impl From<&Session> for Caller {
    fn from(session: &Session) -> Self {
        Self {
            uid: session.uid().to_string(),
            role: session.role(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePolicy {
    Staff,
    AdminOrOwner,
    Owner,
    /// The profile's own user, without changing the role, or an owner.
    SelfOrOwner,
    /// The user named by `profileId`, or staff.
    AuthorOrStaff,
}

struct Rule {
    name: &'static str,
    /// Slash-separated segments; `*` matches one segment, a trailing `**` any rest.
    pattern: &'static str,
    policy: WritePolicy,
}

/// First match wins, so narrower patterns come first.
const RULES: &[Rule] = &[
    Rule { name: "records", pattern: "standards/*/record/*", policy: WritePolicy::AdminOrOwner },
    Rule { name: "standards", pattern: "standards/**", policy: WritePolicy::Staff },
    Rule { name: "messages", pattern: "messages/**", policy: WritePolicy::Staff },
    Rule { name: "config", pattern: "config/**", policy: WritePolicy::Staff },
    Rule { name: "tier_checkoffs", pattern: "tier_checkoffs/**", policy: WritePolicy::Staff },
    Rule { name: "checkoffs", pattern: "profiles/*/checkoffs/*", policy: WritePolicy::Staff },
    Rule { name: "profiles", pattern: "profiles/*", policy: WritePolicy::SelfOrOwner },
    Rule { name: "settings", pattern: "settings/**", policy: WritePolicy::Owner },
    Rule { name: "meta", pattern: "meta/**", policy: WritePolicy::Owner },
    Rule { name: "challenge_entries", pattern: "weeklyChallenges/*/entries/*", policy: WritePolicy::AuthorOrStaff },
    Rule { name: "challenges", pattern: "weeklyChallenges/*", policy: WritePolicy::Owner },
    Rule { name: "weekly_logs", pattern: "weekly_logs/*/entries/*", policy: WritePolicy::AuthorOrStaff },
    Rule { name: "monthly_entries", pattern: "monthly_history/*/entries/*", policy: WritePolicy::AuthorOrStaff },
];

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut want = pattern.split('/');
    let mut have = path.split('/');
    loop {
        match (want.next(), have.next()) {
            (Some("**"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(w), Some(h)) if w == h => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn role_of(fields: Option<&Fields>) -> Value {
    fields
        .and_then(|f| f.get("role"))
        .cloned()
        .unwrap_or_else(|| Value::from(Role::Member.as_str()))
}

fn author_of(fields: Option<&Fields>) -> Option<&str> {
    fields.and_then(|f| f.get("profileId")).and_then(Value::as_str)
}

/// Checks one write. `next` is the document as it would be stored, `None` for a delete.
pub fn check_write(caller: &Caller, path: &DocPath, existing: Option<&Fields>, next: Option<&Fields>) -> PortResult<()> {
    let Some(rule) = RULES.iter().find(|r| matches_pattern(r.pattern, path.as_str())) else {
        return Err(PortError::PermissionDenied(format!("{}: no rule allows writes here", path)));
    };

    let denied = |reason: &str| {
        warn!(uid = %caller.uid, path = %path, rule = rule.name, "Write rejected by rules");
        Err(PortError::PermissionDenied(format!("{}: {}", rule.name, reason)))
    };

    match rule.policy {
        WritePolicy::Staff if caller.role.is_staff() => Ok(()),
        WritePolicy::Staff => denied("write requires staff"),
        WritePolicy::AdminOrOwner if matches!(caller.role, Role::Admin | Role::Owner) => Ok(()),
        WritePolicy::AdminOrOwner => denied("write requires admin or owner"),
        WritePolicy::Owner if caller.role == Role::Owner => Ok(()),
        WritePolicy::Owner => denied("write requires owner"),
        WritePolicy::SelfOrOwner => {
            if caller.role == Role::Owner {
                return Ok(());
            }
            if path.id() != caller.uid {
                return denied("only the owner may edit another profile");
            }
            match next {
                None => denied("profiles are never deleted"),
                Some(next) if role_of(existing) != role_of(Some(next)) => denied("only the owner may change a role"),
                Some(_) => Ok(()),
            }
        }
        WritePolicy::AuthorOrStaff => {
            if caller.role.is_staff() {
                return Ok(());
            }
            if existing.is_some() && author_of(existing) != Some(caller.uid.as_str()) {
                return denied("only the author or staff may change an entry");
            }
            match next {
                Some(next) if author_of(Some(next)) != Some(caller.uid.as_str()) => {
                    denied("profileId must be the caller")
                }
                _ => Ok(()),
            }
        }
    }
}

//=========================================================================================
// A store that applies the rules for one caller
//=========================================================================================

pub struct GuardedStore {
    inner: Arc<dyn DocumentStore>,
    caller: Caller,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, caller: Caller) -> Self {
        Self { inner, caller }
    }

    async fn existing(&self, path: &DocPath) -> PortResult<Option<Fields>> {
        Ok(self.inner.get(path).await?.map(|doc| doc.fields))
    }

    async fn check_op(&self, op: &WriteOp) -> PortResult<()> {
        match op {
            WriteOp::Set { path, fields, mode } => {
                let existing = self.existing(path).await?;
                let next = match mode {
                    SetMode::Overwrite => fields.clone(),
                    SetMode::Merge => {
                        let mut merged = existing.clone().unwrap_or_default();
                        merge_fields(&mut merged, fields.clone());
                        merged
                    }
                };
                check_write(&self.caller, path, existing.as_ref(), Some(&next))
            }
            WriteOp::Delete { path } => {
                let existing = self.existing(path).await?;
                check_write(&self.caller, path, existing.as_ref(), None)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for GuardedStore {
    async fn get(&self, path: &DocPath) -> PortResult<Option<Document>> {
        self.inner.get(path).await
    }

    async fn run_query(&self, query: &Query) -> PortResult<Vec<Document>> {
        self.inner.run_query(query).await
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> PortResult<()> {
        let op = WriteOp::Set {
            path: path.clone(),
            fields,
            mode,
        };
        self.check_op(&op).await?;
        match op {
            WriteOp::Set { path, fields, mode } => self.inner.set(&path, fields, mode).await,
            WriteOp::Delete { path } => self.inner.delete(&path).await,
        }
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> PortResult<DocPath> {
        let path = collection.doc(&Uuid::new_v4().simple().to_string());
        check_write(&self.caller, &path, None, Some(&fields))?;
        self.inner.set(&path, fields, SetMode::Overwrite).await?;
        Ok(path)
    }

    async fn delete(&self, path: &DocPath) -> PortResult<()> {
        self.check_op(&WriteOp::Delete { path: path.clone() }).await?;
        self.inner.delete(path).await
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        for op in &ops {
            self.check_op(op).await?;
        }
        self.inner.commit_batch(ops).await
    }

    async fn swap_field(&self, a: &DocPath, b: &DocPath, field: &str) -> PortResult<()> {
        for path in [a, b] {
            let existing = self.existing(path).await?;
            check_write(&self.caller, path, existing.as_ref(), existing.as_ref())?;
        }
        self.inner.swap_field(a, b, field).await
    }

    async fn listen(&self, query: &Query) -> PortResult<SnapshotStream> {
        self.inner.listen(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use station_fit_core::document::paths;
    use station_fit_core::memory::MemoryStore;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn caller(uid: &str, role: Role) -> Caller {
        Caller {
            uid: uid.to_string(),
            role,
        }
    }

    #[test]
    fn patterns_match_by_segment() {
        assert!(matches_pattern("standards/**", "standards/abc"));
        assert!(matches_pattern("standards/*/record/*", "standards/abc/record/current"));
        assert!(!matches_pattern("profiles/*", "profiles/abc/checkoffs/s1"));
        assert!(matches_pattern("profiles/*/checkoffs/*", "profiles/abc/checkoffs/s1"));
        assert!(!matches_pattern("weeklyChallenges/*", "weekly_logs/2024-W05"));
    }

    #[test]
    fn record_writes_need_admin_or_owner() {
        let path = paths::record("s1");
        let next = fields(json!({"holderName": "Sam", "value": 5}));
        let err = check_write(&caller("t1", Role::Mentor), &path, None, Some(&next)).unwrap_err();
        assert_eq!(err, PortError::PermissionDenied("records: write requires admin or owner".into()));
        assert!(check_write(&caller("a1", Role::Admin), &path, None, Some(&next)).is_ok());
    }

    #[test]
    fn members_edit_their_own_profile_but_not_their_role() {
        let me = caller("m1", Role::Member);
        let existing = fields(json!({"displayName": "Mo", "role": "member"}));
        let renamed = fields(json!({"displayName": "Moe", "role": "member"}));
        let promoted = fields(json!({"displayName": "Mo", "role": "owner"}));

        assert!(check_write(&me, &paths::profile("m1"), Some(&existing), Some(&renamed)).is_ok());
        assert!(check_write(&me, &paths::profile("m1"), Some(&existing), Some(&promoted)).is_err());
        assert!(check_write(&me, &paths::profile("m2"), Some(&existing), Some(&renamed)).is_err());
        assert!(check_write(&me, &paths::profile("m1"), None, Some(&renamed)).is_ok());
        assert!(check_write(&caller("o1", Role::Owner), &paths::profile("m1"), Some(&existing), Some(&promoted)).is_ok());
    }

    #[test]
    fn entries_belong_to_their_author() {
        let path = paths::weekly_logs("2024-W05").doc("log1");
        let mine = fields(json!({"profileId": "m1", "value": 3}));
        let theirs = fields(json!({"profileId": "m2", "value": 3}));
        let me = caller("m1", Role::Member);

        assert!(check_write(&me, &path, None, Some(&mine)).is_ok());
        assert!(check_write(&me, &path, None, Some(&theirs)).is_err());
        assert!(check_write(&me, &path, Some(&theirs), None).is_err());
        assert!(check_write(&me, &path, Some(&mine), None).is_ok());
        assert!(check_write(&caller("t1", Role::Mentor), &path, Some(&theirs), None).is_ok());
    }

    #[test]
    fn unknown_collections_are_closed() {
        let path = DocPath::parse("secrets/x").unwrap();
        let next = fields(json!({}));
        assert!(check_write(&caller("o1", Role::Owner), &path, None, Some(&next)).is_err());
    }

    #[tokio::test]
    async fn guarded_store_rejects_before_writing() {
        let memory = Arc::new(MemoryStore::default());
        let store = GuardedStore::new(memory.clone(), caller("m1", Role::Member));

        let err = store
            .set(&paths::standard("s1"), fields(json!({"title": "Row"})), SetMode::Merge)
            .await
            .unwrap_err();
        assert_eq!(err, PortError::PermissionDenied("standards: write requires staff".into()));
        assert_eq!(memory.write_calls(), 0);

        let log = store
            .add(&paths::weekly_logs("2024-W05"), fields(json!({"profileId": "m1", "value": 4})))
            .await
            .unwrap();
        assert!(memory.get(&log).await.unwrap().is_some());
    }
}
