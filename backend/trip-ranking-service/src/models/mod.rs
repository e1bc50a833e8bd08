use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::utils::normalize_weights;

/// Trip document as served by the document store. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    #[serde(alias = "_id")]
    pub id: String,
    /// Owner of the trip; never recommended back to its owner
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub saved_by: Vec<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: owner.into(),
            tags: Vec::new(),
            destination: None,
            budget: None,
            travel_style: None,
            likes: Vec::new(),
            saved_by: Vec::new(),
            created_at: None,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_string());
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_travel_style(mut self, style: &str) -> Self {
        self.travel_style = Some(style.to_string());
        self
    }

    pub fn with_likes(mut self, users: &[&str]) -> Self {
        self.likes = users.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_saved_by(mut self, users: &[&str]) -> Self {
        self.saved_by = users.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !self.user_id.is_empty() && self.user_id == user_id
    }

    /// Destination, with blank strings treated as missing
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref().filter(|d| !d.trim().is_empty())
    }

    pub fn travel_style(&self) -> Option<&str> {
        self.travel_style.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Budget, with non-positive values treated as missing
    pub fn budget(&self) -> Option<f64> {
        self.budget.filter(|b| *b > 0.0)
    }

    /// `|likes| + 0.5 * |savedBy|`
    pub fn popularity(&self) -> f64 {
        self.likes.len() as f64 + 0.5 * self.saved_by.len() as f64
    }

    /// Raw `|likes| + |savedBy|`
    pub fn interaction_count(&self) -> usize {
        self.likes.len() + self.saved_by.len()
    }

    pub fn tag_set(&self) -> HashSet<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn has_interaction_from(&self, user_id: &str) -> bool {
        self.likes.iter().any(|u| u == user_id) || self.saved_by.iter().any(|u| u == user_id)
    }
}

/// Timestamps arrive as RFC 3339 strings, epoch millis, or garbage.
/// Anything unparseable becomes `None` instead of failing the document.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Millis(i64),
        Other(serde_json::Value),
    }

    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Some(RawTimestamp::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(RawTimestamp::Other(value)) => {
            tracing::debug!(%value, "Ignoring unparseable timestamp");
            None
        }
        None => None,
    })
}

/// Weighted keys as they arrive from clients: either `{"beach": 2}` or `["beach"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawWeights {
    Map(HashMap<String, f64>),
    List(Vec<String>),
}

impl Default for RawWeights {
    fn default() -> Self {
        RawWeights::Map(HashMap::new())
    }
}

/// Preferences stored on the user record, used when the top-level field is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredPreferences {
    #[serde(default)]
    pub tags: Option<RawWeights>,
    #[serde(default)]
    pub recent_destinations: Option<RawWeights>,
    #[serde(default)]
    pub avg_budget: Option<f64>,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub favorite_destinations: Option<Vec<String>>,
}

/// Request-scoped user preference profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub liked_trips_ids: Option<Vec<String>>,
    #[serde(default)]
    pub saved_trips_ids: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<RawWeights>,
    #[serde(default)]
    pub recent_destinations: Option<RawWeights>,
    #[serde(default)]
    pub avg_budget: Option<f64>,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub favorite_destinations: Option<Vec<String>>,
    #[serde(default)]
    pub followings: Vec<String>,
    #[serde(default)]
    pub preferences: Option<StoredPreferences>,
}

/// User record as stored in the document store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub followings: Vec<String>,
    #[serde(default)]
    pub saved_trips: Vec<String>,
    #[serde(default)]
    pub preferences: Option<StoredPreferences>,
}

/// Which signals the user declared explicitly (top-level profile fields).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExplicitSignals {
    pub tags: bool,
    pub destinations: bool,
    pub budget: bool,
    pub style: bool,
}

impl ExplicitSignals {
    pub fn any(&self) -> bool {
        self.tags || self.destinations || self.budget || self.style
    }
}

/// Profile with every duck-typed field normalized once at the boundary.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPreferences {
    pub user_id: String,
    pub tags: HashMap<String, f64>,
    pub destinations: HashMap<String, f64>,
    pub budget: Option<f64>,
    pub travel_style: Option<String>,
    pub favorite_destinations: HashSet<String>,
    pub followings: HashSet<String>,
    pub liked: HashSet<String>,
    pub saved: HashSet<String>,
    pub explicit: ExplicitSignals,
}

impl ResolvedPreferences {
    pub fn from_profile(profile: &UserProfile) -> Self {
        let stored = profile.preferences.clone().unwrap_or_default();

        let explicit_tags = normalize_weights(profile.tags.as_ref());
        let explicit_dests = normalize_weights(profile.recent_destinations.as_ref());
        let explicit_budget = profile.avg_budget.filter(|b| *b > 0.0);
        let explicit_style = profile
            .travel_style
            .clone()
            .filter(|s| !s.trim().is_empty());

        let explicit = ExplicitSignals {
            tags: !explicit_tags.is_empty(),
            destinations: !explicit_dests.is_empty(),
            budget: explicit_budget.is_some(),
            style: explicit_style.is_some(),
        };

        let tags = if explicit.tags {
            explicit_tags
        } else {
            normalize_weights(stored.tags.as_ref())
        };
        let destinations = if explicit.destinations {
            explicit_dests
        } else {
            normalize_weights(stored.recent_destinations.as_ref())
        };
        let budget = explicit_budget.or(stored.avg_budget.filter(|b| *b > 0.0));
        let travel_style = explicit_style.or(stored
            .travel_style
            .filter(|s| !s.trim().is_empty()));

        let favorite_destinations = profile
            .favorite_destinations
            .clone()
            .or(stored.favorite_destinations)
            .unwrap_or_default()
            .into_iter()
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            user_id: profile.user_id.clone(),
            tags,
            destinations,
            budget,
            travel_style,
            favorite_destinations,
            followings: profile.followings.iter().cloned().collect(),
            liked: profile
                .liked_trips_ids
                .iter()
                .flatten()
                .cloned()
                .collect(),
            saved: profile
                .saved_trips_ids
                .iter()
                .flatten()
                .cloned()
                .collect(),
            explicit,
        }
    }

    /// Weighted tag overlap: `Σ_{tag ∈ trip.tags} userTagWeight(tag)`
    pub fn tag_overlap_weighted(&self, trip: &Trip) -> f64 {
        trip.tags
            .iter()
            .map(|tag| self.tags.get(tag).copied().unwrap_or(0.0))
            .sum()
    }

    pub fn destination_weight(&self, trip: &Trip) -> f64 {
        trip.destination()
            .and_then(|d| self.destinations.get(d))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn style_matches(&self, trip: &Trip) -> bool {
        match (self.travel_style.as_deref(), trip.travel_style()) {
            (Some(user), Some(trip)) => user == trip,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecallSource {
    Content,
    ItemCF,
    UserCF,
    MatrixFactorization,
    Reranker,
    Hybrid,
}

impl RecallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallSource::Content => "content",
            RecallSource::ItemCF => "item_cf",
            RecallSource::UserCF => "user_cf",
            RecallSource::MatrixFactorization => "matrix_factorization",
            RecallSource::Reranker => "reranker",
            RecallSource::Hybrid => "hybrid",
        }
    }
}

/// A trip with the score assigned by one strategy
#[derive(Debug, Clone)]
pub struct ScoredTrip {
    pub trip: Trip,
    pub score: f64,
    pub source: RecallSource,
}

impl ScoredTrip {
    pub fn new(trip: Trip, score: f64, source: RecallSource) -> Self {
        Self {
            trip,
            score,
            source,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecallStats {
    pub content_count: usize,
    pub item_cf_count: usize,
    pub user_cf_count: usize,
    pub matrix_factorization_count: usize,
    pub candidate_pool_size: usize,
    pub reranked_count: usize,
    pub final_count: usize,
}

/// Engine output: every strategy's ranked list side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub user_id: String,
    pub request_id: String,
    pub top_k: Vec<Trip>,
    pub content_based: Vec<Trip>,
    pub item_collaborative: Vec<Trip>,
    pub user_collaborative: Vec<Trip>,
    pub matrix_factorization: Vec<Trip>,
    pub reranked: Vec<Trip>,
    pub stats: RecallStats,
    pub weights: EngineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_deserializes_mongo_shape() {
        let json = r#"{
            "_id": "t1",
            "userId": "owner",
            "tags": ["beach", "surf"],
            "destination": "Bali",
            "budget": 1200,
            "likes": ["u1", "u2"],
            "savedBy": ["u3"],
            "createdAt": "2024-01-02T03:04:05Z"
        }"#;

        let trip: Trip = serde_json::from_str(json).unwrap();

        assert_eq!(trip.id, "t1");
        assert_eq!(trip.user_id, "owner");
        assert_eq!(trip.destination(), Some("Bali"));
        assert!((trip.popularity() - 2.5).abs() < 1e-9);
        assert_eq!(trip.interaction_count(), 3);
        assert!(trip.created_at.is_some());
    }

    #[test]
    fn test_unparseable_timestamp_is_none() {
        let json = r#"{"id": "t1", "createdAt": "last tuesday"}"#;
        let trip: Trip = serde_json::from_str(json).unwrap();
        assert!(trip.created_at.is_none());

        let json = r#"{"id": "t2", "createdAt": {"$weird": true}}"#;
        let trip: Trip = serde_json::from_str(json).unwrap();
        assert!(trip.created_at.is_none());
    }

    #[test]
    fn test_tags_accept_map_or_list() {
        let as_map: UserProfile =
            serde_json::from_str(r#"{"userId": "u", "tags": {"beach": 2}}"#).unwrap();
        let as_list: UserProfile =
            serde_json::from_str(r#"{"userId": "u", "tags": ["beach", "hiking"]}"#).unwrap();

        let map_prefs = ResolvedPreferences::from_profile(&as_map);
        let list_prefs = ResolvedPreferences::from_profile(&as_list);

        assert_eq!(map_prefs.tags.get("beach"), Some(&2.0));
        assert_eq!(list_prefs.tags.get("hiking"), Some(&1.0));
        assert!(map_prefs.explicit.tags);
    }

    #[test]
    fn test_stored_preferences_are_fallback_only() {
        let profile = UserProfile {
            user_id: "u".to_string(),
            travel_style: Some("adventure".to_string()),
            preferences: Some(StoredPreferences {
                travel_style: Some("luxury".to_string()),
                avg_budget: Some(800.0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let prefs = ResolvedPreferences::from_profile(&profile);

        assert_eq!(prefs.travel_style.as_deref(), Some("adventure"));
        assert_eq!(prefs.budget, Some(800.0));
        assert!(prefs.explicit.style);
        assert!(!prefs.explicit.budget);
    }
}
