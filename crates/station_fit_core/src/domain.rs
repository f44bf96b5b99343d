//! crates/station_fit_core/src/domain.rs
//!
//! Defines the record types for every collection in the store, together with the
//! defaulting rules applied when a raw document is decoded at the read boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::document::{Document, Fields};
use crate::ports::{PortError, PortResult};

//=========================================================================================
// Enumerations
//=========================================================================================

/// Access level of a profile. Everything above `Member` is staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Mentor,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Member, Role::Mentor, Role::Admin, Role::Owner];
    pub const STAFF: [Role; 3] = [Role::Mentor, Role::Admin, Role::Owner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Mentor => "mentor",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Member)
    }
}

impl FromStr for Role {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "mentor" => Ok(Role::Mentor),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(PortError::Invalid(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fitness proficiency level used to group standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Committed,
    Developed,
    Advanced,
    Elite,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Committed, Tier::Developed, Tier::Advanced, Tier::Elite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Committed => "committed",
            Tier::Developed => "developed",
            Tier::Advanced => "advanced",
            Tier::Elite => "elite",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Tier::Committed => 0,
            Tier::Developed => 1,
            Tier::Advanced => 2,
            Tier::Elite => 3,
        }
    }
}

impl FromStr for Tier {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "committed" => Ok(Tier::Committed),
            "developed" | "developmental" => Ok(Tier::Developed),
            "advanced" => Ok(Tier::Advanced),
            "elite" => Ok(Tier::Elite),
            other => Err(PortError::Invalid(format!("unknown tier '{}'", other))),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of period a challenge spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Weekly,
    Monthly,
}

impl FromStr for PeriodKind {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PeriodKind::Weekly),
            "monthly" => Ok(PeriodKind::Monthly),
            other => Err(PortError::Invalid(format!("unknown period kind '{}'", other))),
        }
    }
}

//=========================================================================================
// Lenient field readers
//=========================================================================================

fn lenient_role<'de, D: Deserializer<'de>>(d: D) -> Result<Role, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|r| r.parse().ok()).unwrap_or(Role::Member))
}

fn lenient_tier<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Tier>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|r| r.parse().ok()))
}

fn lenient_tier_or_committed<'de, D: Deserializer<'de>>(d: D) -> Result<Tier, D::Error> {
    Ok(lenient_tier(d)?.unwrap_or(Tier::Committed))
}

/// Scores are sometimes stored as strings; anything unparseable counts as zero.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_order<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(lenient_number(d)?.round() as i64)
}

fn default_true() -> bool {
    true
}

fn default_category() -> String {
    "General".to_string()
}

fn decode_fields<T: DeserializeOwned>(doc: &Document) -> PortResult<T> {
    serde_json::from_value(Value::Object(doc.fields.clone()))
        .map_err(|e| PortError::Invalid(format!("{}: {}", doc.path, e)))
}

/// Typed view of a raw document.
pub trait FromDocument: Sized {
    fn from_document(doc: &Document) -> PortResult<Self>;
}

//=========================================================================================
// Records
//=========================================================================================

/// The signed-in identity reported by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_deserializing)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "member_role", deserialize_with = "lenient_role")]
    pub role: Role,
    #[serde(default, deserialize_with = "lenient_tier")]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn member_role() -> Role {
    Role::Member
}

impl FromDocument for Profile {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut profile: Profile = decode_fields(doc)?;
        profile.id = doc.id().to_string();
        if profile.display_name.trim().is_empty() {
            profile.display_name = profile
                .email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|local| !local.is_empty())
                .unwrap_or("Member")
                .to_string();
        }
        Ok(profile)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Standard {
    #[serde(default, skip_deserializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default = "committed_tier", deserialize_with = "lenient_tier_or_committed")]
    pub tier: Tier,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_order")]
    pub order: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn committed_tier() -> Tier {
    Tier::Committed
}

impl FromDocument for Standard {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut standard: Standard = decode_fields(doc)?;
        standard.id = doc.id().to_string();
        Ok(standard)
    }
}

/// Pass/fail of one standard for one profile, stored at `profiles/{p}/checkoffs/{s}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkoff {
    #[serde(default, skip_deserializing)]
    pub profile_id: String,
    #[serde(default, skip_deserializing)]
    pub standard_id: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl FromDocument for Checkoff {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut checkoff: Checkoff = decode_fields(doc)?;
        let segments = doc.path.segments();
        checkoff.profile_id = segments.get(1).copied().unwrap_or_default().to_string();
        checkoff.standard_id = doc.id().to_string();
        Ok(checkoff)
    }
}

/// Whole-tier sign-off, stored at `tier_checkoffs/{profileId}_{tier}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TierCheckoff {
    pub profile_id: String,
    #[serde(deserialize_with = "lenient_tier_or_committed")]
    pub tier: Tier,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FromDocument for TierCheckoff {
    fn from_document(doc: &Document) -> PortResult<Self> {
        decode_fields(doc)
    }
}

/// A time-boxed weekly or monthly challenge keyed by its period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(default, skip_deserializing)]
    pub id: String,
    #[serde(default = "weekly_kind", skip_deserializing)]
    pub kind: PeriodKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub active: bool,
}

fn weekly_kind() -> PeriodKind {
    PeriodKind::Weekly
}

impl FromDocument for Challenge {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut challenge: Challenge = decode_fields(doc)?;
        match doc.id().strip_prefix("monthly_") {
            Some(month_id) if doc.path.collection().as_str() == "meta" => {
                challenge.id = month_id.to_string();
                challenge.kind = PeriodKind::Monthly;
            }
            _ => {
                challenge.id = doc.id().to_string();
                challenge.kind = PeriodKind::Weekly;
            }
        }
        Ok(challenge)
    }
}

/// One score submission within a period: a weekly log or a monthly entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default, skip_deserializing)]
    pub id: String,
    pub profile_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FromDocument for Entry {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut entry: Entry = decode_fields(doc)?;
        entry.id = doc.id().to_string();
        Ok(entry)
    }
}

/// Best-known result for a standard, stored at `standards/{id}/record/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_deserializing)]
    pub standard_id: String,
    #[serde(default)]
    pub holder_id: Option<String>,
    #[serde(default)]
    pub holder_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub verifier_id: Option<String>,
    #[serde(default)]
    pub verifier_name: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl FromDocument for Record {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut record: Record = decode_fields(doc)?;
        let segments = doc.path.segments();
        record.standard_id = segments.get(1).copied().unwrap_or_default().to_string();
        Ok(record)
    }
}

/// An announcement on the station board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_deserializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FromDocument for Message {
    fn from_document(doc: &Document) -> PortResult<Self> {
        let mut message: Message = decode_fields(doc)?;
        message.id = doc.id().to_string();
        Ok(message)
    }
}

/// Free-form configuration blob, e.g. the entry quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub key: String,
    pub fields: Fields,
}

impl FromDocument for Settings {
    fn from_document(doc: &Document) -> PortResult<Self> {
        Ok(Settings {
            key: doc.id().to_string(),
            fields: doc.fields.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{paths, DocPath};
    use serde_json::json;

    fn doc(path: DocPath, fields: Value) -> Document {
        Document {
            path,
            fields: fields.as_object().cloned().unwrap(),
            update_time: Utc::now(),
        }
    }

    #[test]
    fn profile_defaults_apply_at_read_boundary() {
        let raw = doc(
            paths::profile("u1"),
            json!({"email": "casey@station1.org", "role": "captain", "tier": "developmental"}),
        );
        let profile = Profile::from_document(&raw).unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.display_name, "casey");
        assert_eq!(profile.role, Role::Member);
        assert_eq!(profile.tier, Some(Tier::Developed));
    }

    #[test]
    fn standard_requires_title_and_defaults_rest() {
        let missing = doc(paths::standard("s1"), json!({"tier": "elite"}));
        assert!(Standard::from_document(&missing).is_err());

        let raw = doc(paths::standard("s1"), json!({"title": "Push-ups", "order": "3"}));
        let standard = Standard::from_document(&raw).unwrap();
        assert_eq!(standard.tier, Tier::Committed);
        assert_eq!(standard.category, "General");
        assert_eq!(standard.order, 3);
        assert!(standard.active);
    }

    #[test]
    fn ids_come_from_paths() {
        let checkoff = Checkoff::from_document(&doc(paths::checkoff("p1", "s9"), json!({"done": true}))).unwrap();
        assert_eq!((checkoff.profile_id.as_str(), checkoff.standard_id.as_str()), ("p1", "s9"));

        let record = Record::from_document(&doc(paths::record("s9"), json!({"value": "42"}))).unwrap();
        assert_eq!(record.standard_id, "s9");
        assert_eq!(record.value, 42.0);

        let monthly = Challenge::from_document(&doc(paths::monthly_meta("2024-03"), json!({"active": true}))).unwrap();
        assert_eq!(monthly.id, "2024-03");
        assert_eq!(monthly.kind, PeriodKind::Monthly);
    }

    #[test]
    fn role_and_tier_parsing() {
        assert_eq!("Owner".parse::<Role>().unwrap(), Role::Owner);
        assert!("chief".parse::<Role>().is_err());
        assert!(Role::Mentor.is_staff());
        assert!(!Role::Member.is_staff());
        assert!(Tier::Elite.rank() > Tier::Committed.rank());
    }
}
