//! Daily "what to eat" selection.
//!
//! The pick is a pure function of the user id, the calendar day and the
//! candidate list, so a user asking twice on the same day sees the same food
//! even before the stored record is consulted.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};

use crate::models::Food;

/// Foods recommended within this many previous days are skipped.
pub const RECENT_WINDOW_DAYS: i64 = 7;

pub fn date_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First day whose recommendations count as recent for `today`.
pub fn recent_window_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(RECENT_WINDOW_DAYS)
}

/// 32-bit string hash over UTF-16 code units, `h = h * 31 + unit` with wrapping.
pub fn seed_hash(seed: &str) -> i32 {
    seed.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

pub fn pick_index(seed: &str, len: usize) -> usize {
    debug_assert!(len > 0);
    seed_hash(seed).unsigned_abs() as usize % len
}

/// Picks the food for `user_id` on `today`, avoiding `recent` food ids unless
/// that would leave nothing to pick.
pub fn pick<'a>(
    user_id: &str,
    today: NaiveDate,
    foods: &'a [Food],
    recent: &HashSet<String>,
) -> Option<&'a Food> {
    let mut all: Vec<&Food> = foods.iter().collect();
    all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let fresh: Vec<&Food> = all
        .iter()
        .copied()
        .filter(|food| !recent.contains(&food.id))
        .collect();
    let candidates = if fresh.is_empty() { all } else { fresh };
    if candidates.is_empty() {
        return None;
    }

    let seed = format!("{user_id}{}", date_string(today));
    Some(candidates[pick_index(&seed, candidates.len())])
}
