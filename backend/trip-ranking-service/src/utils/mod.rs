// Utility functions for trip-ranking-service

use crate::models::RawWeights;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Normalize `{"tag": weight}` or `["tag", ...]` into a single weight map.
/// List entries get weight 1; empty keys are dropped.
pub fn normalize_weights(raw: Option<&RawWeights>) -> HashMap<String, f64> {
    match raw {
        Some(RawWeights::Map(map)) => map
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
        Some(RawWeights::List(list)) => list
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| (k.clone(), 1.0))
            .collect(),
        None => HashMap::new(),
    }
}

/// `|A ∩ B| / |A ∪ B|`, 0 when both sets are empty
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// `max(0, 1 - |u - t| / max(u, t, 1))`, 0 if either budget is missing
pub fn budget_similarity(user_budget: Option<f64>, trip_budget: Option<f64>) -> f64 {
    match (user_budget, trip_budget) {
        (Some(u), Some(t)) if u > 0.0 && t > 0.0 => {
            let denom = u.max(t).max(1.0);
            (1.0 - (u - t).abs() / denom).max(0.0)
        }
        _ => 0.0,
    }
}

/// Whole days elapsed since `created_at`, 0 when missing or in the future
pub fn age_days(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    created_at.map(|ts| (now - ts).num_days().max(0) as f64)
}

/// Exponential decay with a half-life: `exp(-ln2 * age / half_life)`
pub fn exponential_decay(age: f64, half_life: f64) -> f64 {
    if half_life <= 0.0 {
        return 0.0;
    }
    (-std::f64::consts::LN_2 * age / half_life).exp()
}

/// Stable value in `[0, scale)` derived from an id. Used as a secondary sort key.
pub fn id_tie_break(id: &str, scale: f64) -> f64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(bytes) as f64 / u64::MAX as f64;
    value * scale
}

/// Descending comparator for scores. NaN compares equal so sorts stay stable.
pub fn score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
