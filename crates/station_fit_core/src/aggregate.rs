//! crates/station_fit_core/src/aggregate.rs
//!
//! Pure aggregation over decoded snapshots: rankings, progress, per-period
//! coalescing and streaks. Everything here is recomputed from scratch on each
//! snapshot.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::{Checkoff, Entry, Message, Standard, Tier};

/// Number of periods a streak looks back by default.
pub const STREAK_LOOKBACK: usize = 12;

/// Podium placements of one member across past periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodiumCounts {
    pub profile_id: String,
    pub name: String,
    pub firsts: u32,
    pub seconds: u32,
    pub thirds: u32,
}

impl PodiumCounts {
    pub fn total(&self) -> u32 {
        self.firsts * 3 + self.seconds * 2 + self.thirds
    }
}

/// Summed submissions of one member within a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTotal {
    pub profile_id: String,
    pub name: String,
    pub total: f64,
    pub count: u32,
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRow {
    pub rank: usize,
    pub profile_id: String,
    pub name: String,
    pub score: f64,
    pub count: u32,
}

/// Score descending, then name ascending.
fn by_score_then_name(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.cmp(b.1))
}

pub fn rank_podium(mut members: Vec<PodiumCounts>) -> Vec<RankedRow> {
    members.sort_by(|a, b| by_score_then_name((a.total() as f64, &a.name), (b.total() as f64, &b.name)));
    members
        .into_iter()
        .enumerate()
        .map(|(i, m)| RankedRow {
            rank: i + 1,
            score: m.total() as f64,
            count: m.firsts + m.seconds + m.thirds,
            profile_id: m.profile_id,
            name: m.name,
        })
        .collect()
}

pub fn rank_totals(mut totals: Vec<MemberTotal>) -> Vec<RankedRow> {
    totals.sort_by(|a, b| by_score_then_name((a.total, &a.name), (b.total, &b.name)));
    totals
        .into_iter()
        .enumerate()
        .map(|(i, t)| RankedRow {
            rank: i + 1,
            profile_id: t.profile_id,
            name: t.name,
            score: t.total,
            count: t.count,
        })
        .collect()
}

/// `done / total` as a whole percentage; an empty total is 0%.
pub fn progress_percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as u32
}

fn entry_name(entry: &Entry) -> String {
    if entry.display_name.trim().is_empty() {
        entry.profile_id.clone()
    } else {
        entry.display_name.clone()
    }
}

/// Sums and counts every log per member.
pub fn coalesce_logs(entries: &[Entry]) -> Vec<MemberTotal> {
    let mut by_member: HashMap<&str, MemberTotal> = HashMap::new();
    for entry in entries {
        let slot = by_member
            .entry(entry.profile_id.as_str())
            .or_insert_with(|| MemberTotal {
                profile_id: entry.profile_id.clone(),
                name: entry_name(entry),
                total: 0.0,
                count: 0,
            });
        slot.total += entry.value;
        slot.count += 1;
    }
    by_member.into_values().collect()
}

/// Keeps the latest entry per member; later `created_at` wins, and without
/// timestamps the later position in the snapshot wins.
pub fn latest_per_member(entries: &[Entry]) -> Vec<Entry> {
    let mut latest: HashMap<&str, &Entry> = HashMap::new();
    for entry in entries {
        match latest.get(entry.profile_id.as_str()) {
            Some(current) if current.created_at > entry.created_at => {}
            _ => {
                latest.insert(entry.profile_id.as_str(), entry);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Consecutive `true` flags from the most recent period backwards, looking at no
/// more than `lookback` periods.
pub fn streak(done_flags: impl IntoIterator<Item = bool>, lookback: usize) -> u32 {
    done_flags
        .into_iter()
        .take(lookback)
        .take_while(|done| *done)
        .count() as u32
}

/// Counts 1st/2nd/3rd places across several ranked boards.
pub fn podium_counts(boards: &[Vec<RankedRow>]) -> Vec<PodiumCounts> {
    let mut counts: HashMap<String, PodiumCounts> = HashMap::new();
    for board in boards {
        for row in board.iter().take(3) {
            let slot = counts
                .entry(row.profile_id.clone())
                .or_insert_with(|| PodiumCounts {
                    profile_id: row.profile_id.clone(),
                    name: row.name.clone(),
                    firsts: 0,
                    seconds: 0,
                    thirds: 0,
                });
            match row.rank {
                1 => slot.firsts += 1,
                2 => slot.seconds += 1,
                _ => slot.thirds += 1,
            }
        }
    }
    counts.into_values().collect()
}

/// Tier rank, then sort key, then title.
pub fn sort_standards(standards: &mut [Standard]) {
    standards.sort_by(|a, b| {
        a.tier
            .rank()
            .cmp(&b.tier.rank())
            .then(a.order.cmp(&b.order))
            .then_with(|| a.title.cmp(&b.title))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProgress {
    pub tier: Tier,
    pub done: usize,
    pub total: usize,
    pub percent: u32,
}

/// Progress of one member over the active standards of a tier.
pub fn tier_progress(tier: Tier, standards: &[Standard], checkoffs: &[Checkoff]) -> TierProgress {
    let in_tier: Vec<&Standard> = standards
        .iter()
        .filter(|s| s.tier == tier && s.active)
        .collect();
    let done = in_tier
        .iter()
        .filter(|s| checkoffs.iter().any(|c| c.standard_id == s.id && c.done))
        .count();
    TierProgress {
        tier,
        done,
        total: in_tier.len(),
        percent: progress_percent(done, in_tier.len()),
    }
}

/// Pinned messages first, newest first within each group.
pub fn pinned_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn podium(name: &str, firsts: u32, seconds: u32, thirds: u32) -> PodiumCounts {
        PodiumCounts {
            profile_id: name.to_lowercase(),
            name: name.to_string(),
            firsts,
            seconds,
            thirds,
        }
    }

    fn entry(profile_id: &str, value: f64, minute: u32) -> Entry {
        Entry {
            id: format!("{}-{}", profile_id, minute),
            profile_id: profile_id.to_string(),
            display_name: profile_id.to_uppercase(),
            value,
            unit: "reps".into(),
            notes: String::new(),
            done: false,
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()),
        }
    }

    #[test]
    fn podium_ties_break_by_name() {
        let ranked = rank_podium(vec![podium("B", 0, 2, 0), podium("A", 1, 0, 0)]);
        let names: Vec<_> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(ranked.iter().all(|r| r.score == 3.0));
    }

    #[test]
    fn podium_order_is_non_increasing() {
        let ranked = rank_podium(vec![
            podium("Cy", 0, 0, 4),
            podium("Al", 2, 1, 0),
            podium("Bo", 0, 0, 1),
            podium("Di", 1, 1, 1),
        ]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].name, "Al");
        assert_eq!(ranked[0].score, 8.0);
        assert_eq!(ranked.last().unwrap().rank, 4);
    }

    #[test]
    fn progress_rounds_and_guards_zero() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(5, 0), 0);
        assert_eq!(progress_percent(3, 4), 75);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
    }

    #[test]
    fn streak_stops_at_first_gap() {
        assert_eq!(streak([true, true, false, true], STREAK_LOOKBACK), 2);
        assert_eq!(streak([false, true], STREAK_LOOKBACK), 0);
        assert_eq!(streak(vec![true; 20], STREAK_LOOKBACK), 12);
    }

    #[test]
    fn logs_coalesce_per_member() {
        let mut totals = coalesce_logs(&[entry("a", 10.0, 1), entry("b", 5.0, 2), entry("a", 7.5, 3)]);
        totals.sort_by(|x, y| x.profile_id.cmp(&y.profile_id));
        assert_eq!(totals[0].total, 17.5);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals[1].count, 1);

        let ranked = rank_totals(totals);
        assert_eq!(ranked[0].profile_id, "a");
    }

    #[test]
    fn latest_entry_wins() {
        let latest = latest_per_member(&[entry("a", 10.0, 5), entry("a", 3.0, 1)]);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].value, 10.0);
    }

    #[test]
    fn podium_counts_from_boards() {
        let board = |ids: &[&str]| -> Vec<RankedRow> {
            ids.iter()
                .enumerate()
                .map(|(i, id)| RankedRow {
                    rank: i + 1,
                    profile_id: id.to_string(),
                    name: id.to_string(),
                    score: 0.0,
                    count: 1,
                })
                .collect()
        };
        let mut counts = podium_counts(&[board(&["a", "b", "c", "d"]), board(&["b", "a"])]);
        counts.sort_by(|x, y| x.profile_id.cmp(&y.profile_id));
        assert_eq!(counts.len(), 3);
        assert_eq!((counts[0].firsts, counts[0].seconds), (1, 1));
        assert_eq!((counts[1].firsts, counts[1].seconds), (1, 1));
        assert_eq!(counts[2].thirds, 1);
    }
}
