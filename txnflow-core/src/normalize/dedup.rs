//! Stable first-seen deduplication.

use std::collections::HashSet;
use std::hash::Hash;

/// Keep the first row for each key, preserving input order.
///
/// `None` keys compare equal to each other, so at most one keyless row
/// survives.
pub fn dedup_by_key<T, K, F>(rows: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}
