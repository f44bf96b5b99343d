//! crates/station_fit_core/src/gateway.rs
//!
//! The role-gated mutation gateway. Each operation validates its input, checks the
//! session's role against the action table, and only then writes. Errors are
//! returned per operation and never retried.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{self, AccessDenied, Action};
use crate::aggregate::sort_standards;
use crate::document::{ensure_id, paths, DocPath, Fields, Query, SetMode, WriteOp};
use crate::domain::{Entry, FromDocument, PeriodKind, Role, Standard, Tier};
use crate::fallback::full_catalog;
use crate::live::{decode_all, fetch_ordered};
use crate::period;
use crate::ports::{DocumentStore, PortError};
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Rejected locally before any store call.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Forbidden(#[from] AccessDenied),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

//=========================================================================================
// Inputs
//=========================================================================================

/// A score as typed into a form: a number or free text that must parse as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(untagged)]
pub enum ScoreInput {
    Number(f64),
    Text(String),
}

impl ScoreInput {
    pub fn parse(&self) -> GatewayResult<f64> {
        let value = match self {
            ScoreInput::Number(n) => *n,
            ScoreInput::Text(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| GatewayError::Validation(format!("'{}' is not a number", raw.trim())))?,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(GatewayError::Validation("Score must be a non-negative number".into()));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub shift: Option<String>,
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StandardDraft {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    pub tier: Tier,
    pub category: Option<String>,
    pub order: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StandardUpdate {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub tier: Option<Tier>,
    pub category: Option<String>,
    pub order: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDraft {
    /// Period key: `YYYY-Www` for weekly, `YYYY-MM` for monthly.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub value: ScoreInput,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub holder_id: Option<String>,
    pub holder_name: String,
    pub value: ScoreInput,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn required(label: &str, value: &str) -> GatewayResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation(format!("{} is required", label)));
    }
    Ok(trimmed.to_string())
}

fn valid_id(id: &str) -> GatewayResult<()> {
    ensure_id(id).map_err(|e| GatewayError::Validation(e.to_string()))
}

fn valid_period(kind: PeriodKind, id: &str) -> GatewayResult<()> {
    let checked = match kind {
        PeriodKind::Weekly => period::validate_week_id(id),
        PeriodKind::Monthly => period::validate_month_id(id),
    };
    checked.map_err(|e| GatewayError::Validation(e.to_string()))
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

//=========================================================================================
// The gateway
//=========================================================================================

pub struct MutationGateway {
    store: Arc<dyn DocumentStore>,
    session: Session,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn DocumentStore>, session: Session) -> Self {
        Self { store, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn authorize(&self, action: Action) -> GatewayResult<()> {
        access::authorize(self.session.role(), action).map_err(|denied| {
            warn!(uid = %self.session.uid(), role = %denied.role, action = %denied.action, "Mutation blocked by role gate");
            GatewayError::from(denied)
        })
    }

    async fn merge(&self, path: &DocPath, fields: Value) -> GatewayResult<()> {
        self.store.set(path, object(fields), SetMode::Merge).await?;
        info!(uid = %self.session.uid(), path = %path, "Merged document");
        Ok(())
    }

    async fn remove(&self, path: &DocPath) -> GatewayResult<()> {
        self.store.delete(path).await?;
        info!(uid = %self.session.uid(), path = %path, "Deleted document");
        Ok(())
    }

    // --- Profiles ---

    /// Updates the caller's own basic fields. Id and role are never written here.
    pub async fn update_own_profile(&self, update: ProfileUpdate) -> GatewayResult<()> {
        let mut fields = Fields::new();
        if let Some(name) = &update.display_name {
            fields.insert("displayName".into(), required("Display name", name)?.into());
        }
        if let Some(shift) = &update.shift {
            fields.insert("shift".into(), shift.trim().into());
        }
        if let Some(tier) = update.tier {
            fields.insert("tier".into(), tier.as_str().into());
        }
        if fields.is_empty() {
            return Err(GatewayError::Validation("Nothing to update".into()));
        }
        self.authorize(Action::EditOwnProfile)?;
        fields.insert("updatedAt".into(), json!(Utc::now()));
        self.merge(&paths::profile(self.session.uid()), Value::Object(fields)).await
    }

    pub async fn assign_role(&self, profile_id: &str, role: Role) -> GatewayResult<()> {
        valid_id(profile_id)?;
        self.authorize(Action::AssignRole)?;
        let path = paths::profile(profile_id);
        if self.store.get(&path).await?.is_none() {
            return Err(PortError::NotFound(format!("Profile {} not found", profile_id)).into());
        }
        self.merge(&path, json!({"role": role, "updatedAt": Utc::now()})).await
    }

    // --- Standards ---

    pub async fn create_standard(&self, draft: StandardDraft) -> GatewayResult<String> {
        let title = required("Title", &draft.title)?;
        self.authorize(Action::EditStandards)?;
        let fields = object(json!({
            "title": title,
            "detail": draft.detail.trim(),
            "tier": draft.tier,
            "category": draft.category.unwrap_or_else(|| "General".into()),
            "order": draft.order.unwrap_or(0),
            "active": draft.active.unwrap_or(true),
            "createdBy": self.session.uid(),
            "createdAt": Utc::now(),
        }));
        let path = self.store.add(&paths::standards(), fields).await?;
        info!(uid = %self.session.uid(), path = %path, "Created standard");
        Ok(path.id().to_string())
    }

    pub async fn update_standard(&self, id: &str, update: StandardUpdate) -> GatewayResult<()> {
        valid_id(id)?;
        let mut fields = Fields::new();
        if let Some(title) = &update.title {
            fields.insert("title".into(), required("Title", title)?.into());
        }
        if let Some(detail) = &update.detail {
            fields.insert("detail".into(), detail.trim().into());
        }
        if let Some(tier) = update.tier {
            fields.insert("tier".into(), tier.as_str().into());
        }
        if let Some(category) = &update.category {
            fields.insert("category".into(), category.trim().into());
        }
        if let Some(order) = update.order {
            fields.insert("order".into(), order.into());
        }
        if let Some(active) = update.active {
            fields.insert("active".into(), active.into());
        }
        if fields.is_empty() {
            return Err(GatewayError::Validation("Nothing to update".into()));
        }
        self.authorize(Action::EditStandards)?;
        self.merge(&paths::standard(id), Value::Object(fields)).await
    }

    pub async fn delete_standard(&self, id: &str) -> GatewayResult<()> {
        valid_id(id)?;
        self.authorize(Action::EditStandards)?;
        self.remove(&paths::standard(id)).await
    }

    /// Exchanges the sort keys of two standards in one transaction.
    pub async fn swap_standard_order(&self, a: &str, b: &str) -> GatewayResult<()> {
        valid_id(a)?;
        valid_id(b)?;
        if a == b {
            return Err(GatewayError::Validation("Pick two different standards".into()));
        }
        self.authorize(Action::EditStandards)?;
        self.store
            .swap_field(&paths::standard(a), &paths::standard(b), "order")
            .await?;
        info!(uid = %self.session.uid(), a, b, "Swapped standard order");
        Ok(())
    }

    /// Renumbers a tier's standards 1..n in their current display order, as one batch.
    pub async fn normalize_standard_order(&self, tier: Tier) -> GatewayResult<usize> {
        self.authorize(Action::EditStandards)?;
        let query = Query::new(paths::standards()).where_eq("tier", tier.as_str());
        let (docs, _) = fetch_ordered(self.store.as_ref(), &query).await?;
        let mut standards: Vec<Standard> = decode_all(&docs);
        sort_standards(&mut standards);

        let ops: Vec<WriteOp> = standards
            .iter()
            .enumerate()
            .map(|(i, s)| WriteOp::Set {
                path: paths::standard(&s.id),
                fields: object(json!({"order": i as i64 + 1})),
                mode: SetMode::Merge,
            })
            .collect();
        let count = ops.len();
        if count > 0 {
            self.store.commit_batch(ops).await?;
        }
        info!(uid = %self.session.uid(), tier = %tier, count, "Normalized standard order");
        Ok(count)
    }

    /// Writes the built-in catalog into an empty `standards` collection.
    ///
    /// Returns how many standards were written; an already populated collection is
    /// left alone and yields 0.
    pub async fn seed_standards(&self) -> GatewayResult<usize> {
        self.authorize(Action::EditStandards)?;
        let existing = self.store.run_query(&Query::new(paths::standards()).limit(1)).await?;
        if !existing.is_empty() {
            return Ok(0);
        }

        let catalog = full_catalog();
        let mut ops: Vec<WriteOp> = catalog
            .iter()
            .map(|s| WriteOp::Set {
                path: paths::standard(s.id.trim_start_matches("fallback-")),
                fields: object(json!({
                    "title": s.title,
                    "detail": s.detail,
                    "tier": s.tier,
                    "category": s.category,
                    "order": s.order,
                    "active": s.active,
                })),
                mode: SetMode::Overwrite,
            })
            .collect();
        let titles: Vec<&str> = catalog.iter().map(|s| s.title.as_str()).collect();
        ops.push(WriteOp::Set {
            path: paths::standards_master(),
            fields: object(json!({
                "count": catalog.len(),
                "titles": titles,
                "seededBy": self.session.uid(),
                "seededAt": Utc::now(),
            })),
            mode: SetMode::Overwrite,
        });
        self.store.commit_batch(ops).await?;
        info!(uid = %self.session.uid(), count = catalog.len(), "Seeded standards catalog");
        Ok(catalog.len())
    }

    // --- Checkoffs ---

    pub async fn set_checkoff(&self, profile_id: &str, standard_id: &str, done: bool) -> GatewayResult<()> {
        valid_id(profile_id)?;
        valid_id(standard_id)?;
        self.authorize(Action::WriteCheckoffs)?;
        self.merge(
            &paths::checkoff(profile_id, standard_id),
            json!({"done": done, "updatedAt": Utc::now(), "updatedBy": self.session.uid()}),
        )
        .await
    }

    /// Flips a checkoff, creating it as done on first toggle. Returns the new state.
    pub async fn toggle_checkoff(&self, profile_id: &str, standard_id: &str) -> GatewayResult<bool> {
        valid_id(profile_id)?;
        valid_id(standard_id)?;
        self.authorize(Action::WriteCheckoffs)?;
        let current = self
            .store
            .get(&paths::checkoff(profile_id, standard_id))
            .await?
            .and_then(|doc| doc.get("done").and_then(Value::as_bool))
            .unwrap_or(false);
        self.set_checkoff(profile_id, standard_id, !current).await?;
        Ok(!current)
    }

    pub async fn set_tier_checkoff(&self, profile_id: &str, tier: Tier, done: bool) -> GatewayResult<()> {
        valid_id(profile_id)?;
        self.authorize(Action::WriteCheckoffs)?;
        self.merge(
            &paths::tier_checkoff(profile_id, tier.as_str()),
            json!({
                "profileId": profile_id,
                "tier": tier,
                "done": done,
                "updatedAt": Utc::now(),
                "updatedBy": self.session.uid(),
            }),
        )
        .await
    }

    // --- Challenges ---

    pub async fn create_challenge(&self, kind: PeriodKind, draft: ChallengeDraft) -> GatewayResult<()> {
        valid_period(kind, &draft.id)?;
        let title = required("Title", &draft.title)?;
        self.authorize(Action::ManageChallenges)?;
        let (start, end, path) = match kind {
            PeriodKind::Weekly => {
                let (start, end) = period::week_bounds(&draft.id)?;
                (start, end, paths::weekly_challenge(&draft.id))
            }
            PeriodKind::Monthly => {
                let (start, end) = period::month_bounds(&draft.id)?;
                (start, end, paths::monthly_meta(&draft.id))
            }
        };
        self.merge(
            &path,
            json!({
                "title": title,
                "description": draft.description.trim(),
                "unit": draft.unit.trim(),
                "startDate": start,
                "endDate": end,
                "createdBy": self.session.uid(),
                "createdAt": Utc::now(),
            }),
        )
        .await
    }

    /// Flips a challenge's `active` flag. This is a separate write from creation and
    /// does not clear other active challenges.
    pub async fn set_challenge_active(&self, kind: PeriodKind, id: &str, active: bool) -> GatewayResult<()> {
        valid_period(kind, id)?;
        self.authorize(Action::ManageChallenges)?;
        match kind {
            PeriodKind::Weekly => {
                self.merge(&paths::weekly_challenge(id), json!({"active": active}))
                    .await
            }
            PeriodKind::Monthly => {
                self.merge(&paths::monthly_meta(id), json!({"active": active}))
                    .await?;
                if active {
                    self.merge(
                        &paths::monthly_pointer(),
                        json!({"currentMonthId": id, "updatedAt": Utc::now()}),
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    // --- Entries ---

    /// Appends a weekly log owned by the caller and returns its id.
    pub async fn log_weekly(&self, week_id: &str, submission: ScoreSubmission) -> GatewayResult<String> {
        valid_period(PeriodKind::Weekly, week_id)?;
        let value = submission.value.parse()?;
        self.authorize(Action::SubmitEntry)?;
        let fields = object(json!({
            "profileId": self.session.uid(),
            "displayName": self.session.display_name(),
            "value": value,
            "unit": submission.unit.trim(),
            "notes": submission.notes.trim(),
            "done": submission.done,
            "createdAt": Utc::now(),
        }));
        let path = self.store.add(&paths::weekly_logs(week_id), fields).await?;
        info!(uid = %self.session.uid(), path = %path, value, "Logged weekly score");
        Ok(path.id().to_string())
    }

    /// Upserts the caller's single entry for a month; the latest submission wins.
    pub async fn submit_monthly_entry(&self, month_id: &str, submission: ScoreSubmission) -> GatewayResult<()> {
        valid_period(PeriodKind::Monthly, month_id)?;
        let value = submission.value.parse()?;
        self.authorize(Action::SubmitEntry)?;
        let path = paths::monthly_entries(month_id).doc(self.session.uid());
        self.merge(
            &path,
            json!({
                "profileId": self.session.uid(),
                "displayName": self.session.display_name(),
                "value": value,
                "unit": submission.unit.trim(),
                "notes": submission.notes.trim(),
                "done": submission.done,
                "createdAt": Utc::now(),
            }),
        )
        .await
    }

    /// Staff may delete any entry; members only their own.
    async fn delete_entry(&self, path: DocPath) -> GatewayResult<()> {
        if !access::is_allowed(self.session.role(), Action::ModerateEntries) {
            let owner = match self.store.get(&path).await? {
                Some(doc) => Entry::from_document(&doc)?.profile_id,
                None => return Err(PortError::NotFound(path.to_string()).into()),
            };
            if owner != self.session.uid() {
                self.authorize(Action::ModerateEntries)?;
            }
        }
        self.remove(&path).await
    }

    pub async fn delete_weekly_log(&self, week_id: &str, log_id: &str) -> GatewayResult<()> {
        valid_period(PeriodKind::Weekly, week_id)?;
        valid_id(log_id)?;
        self.delete_entry(paths::weekly_logs(week_id).doc(log_id)).await
    }

    pub async fn delete_monthly_entry(&self, month_id: &str, profile_id: &str) -> GatewayResult<()> {
        valid_period(PeriodKind::Monthly, month_id)?;
        valid_id(profile_id)?;
        self.delete_entry(paths::monthly_entries(month_id).doc(profile_id)).await
    }

    // --- Records ---

    /// Replaces the current record of a standard.
    pub async fn set_record(&self, standard_id: &str, draft: RecordDraft) -> GatewayResult<()> {
        valid_id(standard_id)?;
        let holder_name = required("Holder name", &draft.holder_name)?;
        let value = draft.value.parse()?;
        self.authorize(Action::WriteRecord)?;
        let path = paths::record(standard_id);
        let fields = object(json!({
            "holderId": draft.holder_id,
            "holderName": holder_name,
            "value": value,
            "unit": draft.unit.trim(),
            "notes": draft.notes.trim(),
            "verifierId": self.session.uid(),
            "verifierName": self.session.display_name(),
            "recordedAt": Utc::now(),
        }));
        self.store.set(&path, fields, SetMode::Overwrite).await?;
        info!(uid = %self.session.uid(), path = %path, value, "Recorded new best");
        Ok(())
    }

    // --- Messages ---

    pub async fn post_message(&self, draft: MessageDraft) -> GatewayResult<String> {
        let title = required("Title", &draft.title)?;
        self.authorize(Action::ManageMessages)?;
        let now = Utc::now();
        let fields = object(json!({
            "title": title,
            "body": draft.body.trim(),
            "pinned": draft.pinned,
            "authorId": self.session.uid(),
            "authorName": self.session.display_name(),
            "createdAt": now,
            "updatedAt": now,
        }));
        let path = self.store.add(&paths::messages(), fields).await?;
        info!(uid = %self.session.uid(), path = %path, "Posted message");
        Ok(path.id().to_string())
    }

    pub async fn edit_message(&self, id: &str, update: MessageUpdate) -> GatewayResult<()> {
        valid_id(id)?;
        let mut fields = Fields::new();
        if let Some(title) = &update.title {
            fields.insert("title".into(), required("Title", title)?.into());
        }
        if let Some(body) = &update.body {
            fields.insert("body".into(), body.trim().into());
        }
        if fields.is_empty() {
            return Err(GatewayError::Validation("Nothing to update".into()));
        }
        self.authorize(Action::ManageMessages)?;
        fields.insert("updatedAt".into(), json!(Utc::now()));
        self.merge(&paths::message(id), Value::Object(fields)).await
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool) -> GatewayResult<()> {
        valid_id(id)?;
        self.authorize(Action::ManageMessages)?;
        self.merge(&paths::message(id), json!({"pinned": pinned, "updatedAt": Utc::now()}))
            .await
    }

    pub async fn delete_message(&self, id: &str) -> GatewayResult<()> {
        valid_id(id)?;
        self.authorize(Action::ManageMessages)?;
        self.remove(&paths::message(id)).await
    }

    // --- Settings ---

    pub async fn write_settings(&self, key: &str, fields: Fields) -> GatewayResult<()> {
        valid_id(key)?;
        if fields.is_empty() {
            return Err(GatewayError::Validation("Nothing to update".into()));
        }
        self.authorize(Action::WriteSettings)?;
        self.merge(&paths::settings(key), Value::Object(fields)).await
    }
}
