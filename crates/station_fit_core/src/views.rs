//! crates/station_fit_core/src/views.rs
//!
//! Page view models. Each page is one or more queries plus an aggregation; the
//! `open_*` functions keep a view live and the `read_*` functions answer once.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::aggregate::{
    coalesce_logs, latest_per_member, pinned_first, podium_counts, rank_podium, rank_totals,
    sort_standards, streak, tier_progress, RankedRow, TierProgress, STREAK_LOOKBACK,
};
use crate::document::{paths, Direction, Query};
use crate::domain::{
    Challenge, Checkoff, Entry, FromDocument, Message, PeriodKind, Profile, Record, Role, Standard, Tier, TierCheckoff,
};
use crate::fallback::fallback_standards;
use crate::live::{decode_all, fetch_ordered, read_view, LiveCollection, ViewState};
use crate::period;
use crate::ports::{DocumentStore, PortResult};

//=========================================================================================
// Standards
//=========================================================================================

pub fn standards_query(tier: Tier) -> Query {
    Query::new(paths::standards())
        .where_eq("tier", tier.as_str())
        .order_by("order", Direction::Asc)
}

fn ordered(mut standards: Vec<Standard>) -> Vec<Standard> {
    sort_standards(&mut standards);
    standards
}

/// Standards of one tier, falling back to the built-in list while the collection is empty.
pub async fn open_standards(store: Arc<dyn DocumentStore>, tier: Tier) -> PortResult<LiveCollection<Vec<Standard>>> {
    LiveCollection::open(store, standards_query(tier), Some(fallback_standards(tier)), ordered).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardsPage {
    pub tier: Tier,
    pub standards: ViewState<Vec<Standard>>,
    /// Present when the page is shown for a specific member.
    pub progress: Option<TierProgress>,
    /// Whether staff signed the whole tier off for that member.
    pub tier_completed: Option<bool>,
}

pub async fn read_standards_page(
    store: &dyn DocumentStore,
    tier: Tier,
    profile_id: Option<&str>,
) -> PortResult<StandardsPage> {
    let fallback = fallback_standards(tier);
    let standards = read_view(store, &standards_query(tier), Some(&fallback[..]), ordered).await?;

    let (progress, tier_completed) = match profile_id {
        Some(pid) => {
            let docs = store.run_query(&Query::new(paths::checkoffs(pid))).await?;
            let checkoffs: Vec<Checkoff> = decode_all(&docs);
            let rows = standards.view.as_deref().unwrap_or_default();
            let completed = match store.get(&paths::tier_checkoff(pid, tier.as_str())).await? {
                Some(doc) => TierCheckoff::from_document(&doc)?.done,
                None => false,
            };
            (Some(tier_progress(tier, rows, &checkoffs)), Some(completed))
        }
        None => (None, None),
    };

    Ok(StandardsPage {
        tier,
        standards,
        progress,
        tier_completed,
    })
}

/// Whole-tier sign-offs recorded for one member, lowest tier first.
pub async fn read_tier_checkoffs(store: &dyn DocumentStore, profile_id: &str) -> PortResult<Vec<TierCheckoff>> {
    let query = Query::new(paths::tier_checkoffs()).where_eq("profileId", profile_id);
    let docs = store.run_query(&query).await?;
    let mut checkoffs: Vec<TierCheckoff> = decode_all(&docs);
    checkoffs.sort_by_key(|c| c.tier);
    Ok(checkoffs)
}

pub async fn read_record(store: &dyn DocumentStore, standard_id: &str) -> PortResult<Option<Record>> {
    match store.get(&paths::record(standard_id)).await? {
        Some(doc) => Ok(Some(Record::from_document(&doc)?)),
        None => Ok(None),
    }
}

//=========================================================================================
// Challenges and boards
//=========================================================================================

/// The active challenge with the latest start date.
///
/// Activation is not exclusive, so more than one may be active; that case is
/// logged and the newest wins.
pub fn active_challenge(challenges: &[Challenge]) -> Option<Challenge> {
    let active: Vec<&Challenge> = challenges.iter().filter(|c| c.active).collect();
    if active.len() > 1 {
        let ids: Vec<&str> = active.iter().map(|c| c.id.as_str()).collect();
        warn!(?ids, "More than one challenge is marked active");
    }
    active
        .into_iter()
        .max_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)))
        .cloned()
}

pub fn challenges_query(kind: PeriodKind) -> Query {
    match kind {
        PeriodKind::Weekly => Query::new(paths::weekly_challenges()),
        PeriodKind::Monthly => Query::new(paths::meta()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeList {
    pub kind: PeriodKind,
    pub challenges: Vec<Challenge>,
    pub active: Option<Challenge>,
}

/// Every challenge of a kind, newest period first.
pub fn challenge_list(kind: PeriodKind, docs: Vec<Challenge>) -> ChallengeList {
    // `meta` also holds the pointer document, which has no period of its own.
    let mut challenges: Vec<Challenge> = docs
        .into_iter()
        .filter(|c| c.kind == kind && !c.id.is_empty() && c.id != "monthly")
        .collect();
    challenges.sort_by(|a, b| b.id.cmp(&a.id));
    let active = active_challenge(&challenges);
    ChallengeList {
        kind,
        challenges,
        active,
    }
}

pub async fn read_challenges(store: &dyn DocumentStore, kind: PeriodKind) -> PortResult<ChallengeList> {
    let docs = store.run_query(&challenges_query(kind)).await?;
    Ok(challenge_list(kind, decode_all(&docs)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub period_id: String,
    pub rows: Vec<RankedRow>,
    pub entries: Vec<Entry>,
}

/// Weekly logs are appended, so every log counts towards the member's total.
pub fn weekly_board(week_id: &str, mut logs: Vec<Entry>) -> Board {
    logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Board {
        period_id: week_id.to_string(),
        rows: rank_totals(coalesce_logs(&logs)),
        entries: logs,
    }
}

/// Monthly entries are one per member; only the latest submission counts.
pub fn monthly_board(month_id: &str, entries: Vec<Entry>) -> Board {
    let mut latest = latest_per_member(&entries);
    let rows = rank_totals(coalesce_logs(&latest));
    latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Board {
        period_id: month_id.to_string(),
        rows,
        entries: latest,
    }
}

pub async fn open_weekly_board(store: Arc<dyn DocumentStore>, week_id: &str) -> PortResult<LiveCollection<Board>> {
    period::validate_week_id(week_id)?;
    let id = week_id.to_string();
    LiveCollection::open(store, Query::new(paths::weekly_logs(week_id)), None, move |logs: Vec<Entry>| {
        weekly_board(&id, logs)
    })
    .await
}

pub async fn open_monthly_board(store: Arc<dyn DocumentStore>, month_id: &str) -> PortResult<LiveCollection<Board>> {
    period::validate_month_id(month_id)?;
    let id = month_id.to_string();
    LiveCollection::open(store, Query::new(paths::monthly_entries(month_id)), None, move |entries: Vec<Entry>| {
        monthly_board(&id, entries)
    })
    .await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPage {
    pub challenge: Option<Challenge>,
    pub board: Board,
}

pub async fn read_weekly_board(store: &dyn DocumentStore, week_id: &str) -> PortResult<BoardPage> {
    period::validate_week_id(week_id)?;
    let challenge = match store.get(&paths::weekly_challenge(week_id)).await? {
        Some(doc) => Some(Challenge::from_document(&doc)?),
        None => None,
    };
    let docs = store.run_query(&Query::new(paths::weekly_logs(week_id))).await?;
    Ok(BoardPage {
        challenge,
        board: weekly_board(week_id, decode_all(&docs)),
    })
}

pub async fn read_monthly_board(store: &dyn DocumentStore, month_id: &str) -> PortResult<BoardPage> {
    period::validate_month_id(month_id)?;
    let challenge = match store.get(&paths::monthly_meta(month_id)).await? {
        Some(doc) => Some(Challenge::from_document(&doc)?),
        None => None,
    };
    let docs = store.run_query(&Query::new(paths::monthly_entries(month_id))).await?;
    Ok(BoardPage {
        challenge,
        board: monthly_board(month_id, decode_all(&docs)),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallOfFame {
    /// Months considered, most recent first.
    pub months: Vec<String>,
    pub rows: Vec<RankedRow>,
}

/// Podium standings over the `count` months ending at `month_id`.
pub async fn read_hall_of_fame(store: &dyn DocumentStore, month_id: &str, count: usize) -> PortResult<HallOfFame> {
    let months = period::months_back(month_id, count)?;
    let mut boards = Vec::with_capacity(months.len());
    for month in &months {
        let docs = store.run_query(&Query::new(paths::monthly_entries(month))).await?;
        boards.push(monthly_board(month, decode_all(&docs)).rows);
    }
    Ok(HallOfFame {
        months,
        rows: rank_podium(podium_counts(&boards)),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakView {
    pub profile_id: String,
    pub through: String,
    pub streak: u32,
}

/// Consecutive months, ending at `month_id`, in which the member marked an entry done.
pub async fn read_monthly_streak(store: &dyn DocumentStore, profile_id: &str, month_id: &str) -> PortResult<StreakView> {
    let months = period::months_back(month_id, STREAK_LOOKBACK)?;
    let mut flags = Vec::with_capacity(months.len());
    for month in &months {
        let done = match store.get(&paths::monthly_entries(month).doc(profile_id)).await? {
            Some(doc) => Entry::from_document(&doc)?.done,
            None => false,
        };
        flags.push(done);
        if !done {
            break;
        }
    }
    Ok(StreakView {
        profile_id: profile_id.to_string(),
        through: month_id.to_string(),
        streak: streak(flags, STREAK_LOOKBACK),
    })
}

//=========================================================================================
// Messages and roster
//=========================================================================================

pub fn message_board(mut messages: Vec<Message>) -> Vec<Message> {
    pinned_first(&mut messages);
    messages
}

pub async fn open_messages(store: Arc<dyn DocumentStore>) -> PortResult<LiveCollection<Vec<Message>>> {
    LiveCollection::open(store, Query::new(paths::messages()), None, message_board).await
}

pub async fn read_messages(store: &dyn DocumentStore) -> PortResult<ViewState<Vec<Message>>> {
    read_view(store, &Query::new(paths::messages()), None::<&[Message]>, message_board).await
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterFilter {
    pub role: Option<Role>,
    pub tier: Option<Tier>,
    pub shift: Option<String>,
}

impl RosterFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        self.role.map_or(true, |r| profile.role == r)
            && self.tier.map_or(true, |t| profile.tier == Some(t))
            && self
                .shift
                .as_deref()
                .map_or(true, |s| profile.shift.as_deref().map_or(false, |own| own.eq_ignore_ascii_case(s)))
    }
}

pub fn roster(profiles: Vec<Profile>, filter: &RosterFilter) -> Vec<Profile> {
    let mut rows: Vec<Profile> = profiles.into_iter().filter(|p| filter.matches(p)).collect();
    rows.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
    rows
}

pub async fn open_roster(store: Arc<dyn DocumentStore>, filter: RosterFilter) -> PortResult<LiveCollection<Vec<Profile>>> {
    LiveCollection::open(store, Query::new(paths::profiles()), None, move |profiles: Vec<Profile>| {
        roster(profiles, &filter)
    })
    .await
}

pub async fn read_roster(store: &dyn DocumentStore, filter: &RosterFilter) -> PortResult<Vec<Profile>> {
    let (docs, _) = fetch_ordered(store, &Query::new(paths::profiles())).await?;
    Ok(roster(decode_all(&docs), filter))
}
