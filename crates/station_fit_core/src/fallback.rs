//! crates/station_fit_core/src/fallback.rs
//!
//! The built-in standards catalog. Pages show it when the `standards` collection is
//! still empty, and staff can seed the collection from it.

use crate::domain::{Standard, Tier};

// (tier, category, title, detail)
const CATALOG: &[(Tier, &str, &str, &str)] = &[
    (Tier::Committed, "Strength", "Push-ups", "25 reps unbroken, chest to fist"),
    (Tier::Committed, "Strength", "Air squats", "50 reps unbroken"),
    (Tier::Committed, "Core", "Plank", "Hold 2:00 on forearms"),
    (Tier::Committed, "Cardio", "1.5 mile run", "Under 13:30"),
    (Tier::Committed, "Job Task", "Stair climb", "5 flights in full turnout gear"),
    (Tier::Developed, "Strength", "Push-ups", "40 reps unbroken, chest to fist"),
    (Tier::Developed, "Strength", "Pull-ups", "8 strict reps"),
    (Tier::Developed, "Core", "Plank", "Hold 3:00 on forearms"),
    (Tier::Developed, "Cardio", "1.5 mile run", "Under 12:30"),
    (Tier::Developed, "Job Task", "Hose drag", "150 ft charged 1 3/4 line in under 45s"),
    (Tier::Advanced, "Strength", "Push-ups", "50 reps unbroken, chest to fist"),
    (Tier::Advanced, "Strength", "Pull-ups", "12 strict reps"),
    (Tier::Advanced, "Strength", "Deadlift", "1.5x bodyweight for 1 rep"),
    (Tier::Advanced, "Cardio", "1.5 mile run", "Under 11:30"),
    (Tier::Advanced, "Job Task", "Dummy drag", "165 lb dummy 100 ft in under 40s"),
    (Tier::Elite, "Strength", "Push-ups", "60 reps unbroken, chest to fist"),
    (Tier::Elite, "Strength", "Pull-ups", "20 strict reps"),
    (Tier::Elite, "Strength", "Deadlift", "2x bodyweight for 1 rep"),
    (Tier::Elite, "Cardio", "1.5 mile run", "Under 10:30"),
    (Tier::Elite, "Job Task", "Combat challenge", "Full course on air in under 3:00"),
];

/// The fixed list for one tier, in display order.
pub fn fallback_standards(tier: Tier) -> Vec<Standard> {
    CATALOG
        .iter()
        .filter(|(t, ..)| *t == tier)
        .enumerate()
        .map(|(i, (tier, category, title, detail))| Standard {
            id: format!("fallback-{}-{}", tier.as_str(), i + 1),
            title: title.to_string(),
            detail: detail.to_string(),
            tier: *tier,
            category: category.to_string(),
            order: i as i64 + 1,
            active: true,
        })
        .collect()
}

/// Every tier's fallback list, lowest tier first.
pub fn full_catalog() -> Vec<Standard> {
    Tier::ALL.iter().flat_map(|t| fallback_standards(*t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tier_has_ordered_fallbacks() {
        for tier in Tier::ALL {
            let list = fallback_standards(tier);
            assert!(!list.is_empty());
            assert!(list.iter().all(|s| s.tier == tier && s.active));
            let orders: Vec<_> = list.iter().map(|s| s.order).collect();
            assert_eq!(orders, (1..=list.len() as i64).collect::<Vec<_>>());
        }
        assert_eq!(full_catalog().len(), CATALOG.len());
    }
}
