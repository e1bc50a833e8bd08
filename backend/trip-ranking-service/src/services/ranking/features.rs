use super::{RankingError, Result};
use crate::models::{ResolvedPreferences, Trip};
use crate::utils::{age_days, budget_similarity};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::HashSet;

/// Feature vector size
/// - Preference match: 6 (tag count/weight, style, budget, recent dest, favorite dest)
/// - Trip engagement: 2 (likes, saves)
/// - Social: 2 (creator followed, followed likers)
/// - Derived: 2 (content score proxy, recency days)
pub const FEATURE_VECTOR_SIZE: usize = 12;

pub const FEATURE_NAMES: [&str; FEATURE_VECTOR_SIZE] = [
    "tag_overlap_count",
    "tag_overlap_weighted",
    "travel_style_match",
    "budget_similarity",
    "recent_dest_weight",
    "favorite_dest_match",
    "trip_likes_count",
    "trip_saved_count",
    "creator_followed",
    "social_lift",
    "content_score",
    "recency_days",
];

pub const TAG_OVERLAP_WEIGHTED: usize = 1;
pub const TRAVEL_STYLE_MATCH: usize = 2;
pub const BUDGET_SIMILARITY: usize = 3;
pub const RECENT_DEST_WEIGHT: usize = 4;

pub struct FeatureExtractor<'a> {
    prefs: &'a ResolvedPreferences,
    now: DateTime<Utc>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(prefs: &'a ResolvedPreferences, now: DateTime<Utc>) -> Self {
        Self { prefs, now }
    }

    /// Features for one (user, trip) pair, in `FEATURE_NAMES` order
    pub fn extract(&self, trip: &Trip) -> [f32; FEATURE_VECTOR_SIZE] {
        let prefs = self.prefs;

        let tag_overlap_count = trip
            .tag_set()
            .into_iter()
            .filter(|t| prefs.tags.contains_key(*t))
            .count() as f64;
        let tag_overlap_weighted = prefs.tag_overlap_weighted(trip);
        let travel_style_match = indicator(prefs.style_matches(trip));
        let budget = budget_similarity(prefs.budget, trip.budget());
        let recent_dest_weight = prefs.destination_weight(trip);
        let favorite_dest_match = indicator(
            trip.destination()
                .is_some_and(|d| prefs.favorite_destinations.contains(d)),
        );

        let creator_followed = indicator(
            !trip.user_id.is_empty() && prefs.followings.contains(&trip.user_id),
        );
        let likers: HashSet<&str> = trip.likes.iter().map(String::as_str).collect();
        let social_lift = prefs
            .followings
            .iter()
            .filter(|f| likers.contains(f.as_str()))
            .count() as f64;

        // unweighted match terms only; no popularity, recency or boosts
        let content_score = tag_overlap_weighted + budget + recent_dest_weight + travel_style_match;
        let recency_days = age_days(trip.created_at, self.now).unwrap_or(0.0);

        [
            tag_overlap_count as f32,
            tag_overlap_weighted as f32,
            travel_style_match as f32,
            budget as f32,
            recent_dest_weight as f32,
            favorite_dest_match as f32,
            trip.likes.len() as f32,
            trip.saved_by.len() as f32,
            creator_followed as f32,
            social_lift as f32,
            content_score as f32,
            recency_days as f32,
        ]
    }

    /// Feature matrix (batch_size × FEATURE_VECTOR_SIZE)
    pub fn build_matrix(&self, trips: &[Trip]) -> Result<Array2<f32>> {
        let flat: Vec<f32> = trips.iter().flat_map(|t| self.extract(t)).collect();
        Array2::from_shape_vec((trips.len(), FEATURE_VECTOR_SIZE), flat)
            .map_err(|e| RankingError::FeatureExtractionError(e.to_string()))
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawWeights, UserProfile};
    use chrono::Duration;
    use std::collections::HashMap;

    fn prefs() -> ResolvedPreferences {
        ResolvedPreferences::from_profile(&UserProfile {
            user_id: "me".to_string(),
            tags: Some(RawWeights::Map(HashMap::from([
                ("beach".to_string(), 2.0),
                ("surf".to_string(), 1.0),
            ]))),
            recent_destinations: Some(RawWeights::List(vec!["Bali".to_string()])),
            avg_budget: Some(1000.0),
            travel_style: Some("relaxed".to_string()),
            favorite_destinations: Some(vec!["Bali".to_string()]),
            followings: vec!["friend".to_string(), "creator".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_feature_order_and_values() {
        let prefs = prefs();
        let now = Utc::now();
        let trip = Trip::new("t", "creator")
            .with_tags(&["beach", "surf", "food"])
            .with_destination("Bali")
            .with_budget(500.0)
            .with_travel_style("relaxed")
            .with_likes(&["friend", "someone"])
            .with_saved_by(&["x"])
            .with_created_at(now - Duration::days(3));

        let f = FeatureExtractor::new(&prefs, now).extract(&trip);

        assert_eq!(f[0], 2.0);
        assert_eq!(f[TAG_OVERLAP_WEIGHTED], 3.0);
        assert_eq!(f[TRAVEL_STYLE_MATCH], 1.0);
        assert!((f[BUDGET_SIMILARITY] - 0.5).abs() < 1e-6);
        assert_eq!(f[RECENT_DEST_WEIGHT], 1.0);
        assert_eq!(f[5], 1.0);
        assert_eq!(f[6], 2.0);
        assert_eq!(f[7], 1.0);
        assert_eq!(f[8], 1.0);
        assert_eq!(f[9], 1.0);
        assert!((f[10] - 5.5).abs() < 1e-6);
        assert_eq!(f[11], 3.0);
    }

    #[test]
    fn test_missing_timestamp_is_zero_days() {
        let prefs = prefs();
        let f = FeatureExtractor::new(&prefs, Utc::now()).extract(&Trip::new("t", "o"));
        assert_eq!(f[11], 0.0);
        assert_eq!(f[8], 0.0);
    }

    #[test]
    fn test_build_matrix_shape() {
        let prefs = prefs();
        let trips = vec![Trip::new("a", "o"), Trip::new("b", "o")];

        let matrix = FeatureExtractor::new(&prefs, Utc::now())
            .build_matrix(&trips)
            .unwrap();

        assert_eq!(matrix.shape(), &[2, FEATURE_VECTOR_SIZE]);
    }
}
