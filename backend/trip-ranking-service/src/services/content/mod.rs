// ============================================
// Content Scorer (内容打分)
// ============================================
//
// Relevance from declared preferences plus cold-start helpers:
//
//   score = Wtag    * Σ userTagWeight(tag)
//         + Wbudget * budgetSimilarity
//         + Wdest   * userDestWeight(destination)
//         + Wstyle  * [style match]
//         + Bliked  * [liked] + Bsaved * [saved]
//         + Wpop    * (|likes| + 0.5 * |savedBy|)
//         + Wrec    * exp(-ln2 * ageDays / halfLifeDays)
//
// Explicit preferences amplify the match weights and damp popularity/recency,
// so cold-start users lean on popularity while engaged users lean on match.

use crate::config::ContentConfig;
use crate::models::{ExplicitSignals, RecallSource, ResolvedPreferences, ScoredTrip, Trip};
use crate::utils::{age_days, budget_similarity, exponential_decay, score_desc};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub const TAG_AMPLIFIER: f64 = 1.6;
pub const DESTINATION_AMPLIFIER: f64 = 1.6;
pub const STYLE_AMPLIFIER: f64 = 1.5;
pub const BUDGET_AMPLIFIER: f64 = 1.4;
/// Applied to popularity and recency once any explicit signal exists
pub const ENGAGED_DAMPING: f64 = 0.5;

/// Weights after explicit-signal amplification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveWeights {
    pub tag: f64,
    pub budget: f64,
    pub destination: f64,
    pub style: f64,
    pub popularity: f64,
    pub recency: f64,
    pub boost_liked: f64,
    pub boost_saved: f64,
}

impl EffectiveWeights {
    pub fn resolve(config: &ContentConfig, explicit: ExplicitSignals) -> Self {
        let amplify = |flag: bool, factor: f64| if flag { factor } else { 1.0 };
        let damping = if explicit.any() { ENGAGED_DAMPING } else { 1.0 };

        Self {
            tag: config.weight_tag * amplify(explicit.tags, TAG_AMPLIFIER),
            budget: config.weight_budget * amplify(explicit.budget, BUDGET_AMPLIFIER),
            destination: config.weight_destination
                * amplify(explicit.destinations, DESTINATION_AMPLIFIER),
            style: config.weight_style * amplify(explicit.style, STYLE_AMPLIFIER),
            popularity: config.weight_pop * damping,
            recency: config.weight_recency * damping,
            boost_liked: config.boost_liked,
            boost_saved: config.boost_saved,
        }
    }
}

/// Result of scoring the eligible corpus
#[derive(Debug, Clone)]
pub struct ContentRanking {
    /// Score-descending candidates
    pub candidates: Vec<ScoredTrip>,
    /// True when nothing scored positive and candidates are ordered by popularity
    pub popularity_fallback: bool,
}

pub struct ContentScorer {
    config: ContentConfig,
}

impl ContentScorer {
    pub fn new(config: ContentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContentConfig {
        &self.config
    }

    /// Score one trip for the user
    pub fn score(
        &self,
        prefs: &ResolvedPreferences,
        trip: &Trip,
        weights: &EffectiveWeights,
        now: DateTime<Utc>,
    ) -> f64 {
        let tag_overlap = prefs.tag_overlap_weighted(trip);
        let budget = budget_similarity(prefs.budget, trip.budget());
        let destination = prefs.destination_weight(trip);
        let style = if prefs.style_matches(trip) { 1.0 } else { 0.0 };

        let liked = if prefs.liked.contains(&trip.id) {
            weights.boost_liked
        } else {
            0.0
        };
        let saved = if prefs.saved.contains(&trip.id) {
            weights.boost_saved
        } else {
            0.0
        };

        let recency = age_days(trip.created_at, now)
            .map(|days| exponential_decay(days, self.config.recency_half_life_days))
            .unwrap_or(0.0);

        weights.tag * tag_overlap
            + weights.budget * budget
            + weights.destination * destination
            + weights.style * style
            + liked
            + saved
            + weights.popularity * trip.popularity()
            + weights.recency * recency
    }

    /// Score every trip not owned by the user. Keeps strictly positive scores;
    /// when none remain, falls back to popularity order so the result is
    /// non-empty whenever an eligible trip exists.
    pub fn rank(
        &self,
        prefs: &ResolvedPreferences,
        trips: &[Trip],
        now: DateTime<Utc>,
    ) -> ContentRanking {
        let weights = EffectiveWeights::resolve(&self.config, prefs.explicit);

        let eligible: Vec<&Trip> = trips
            .iter()
            .filter(|t| !t.is_owned_by(&prefs.user_id))
            .collect();

        let mut positives: Vec<ScoredTrip> = eligible
            .iter()
            .map(|trip| {
                let score = self.score(prefs, trip, &weights, now);
                ScoredTrip::new((*trip).clone(), score, RecallSource::Content)
            })
            .filter(|scored| scored.score > 0.0)
            .collect();

        if !positives.is_empty() {
            positives.sort_by(|a, b| score_desc(a.score, b.score));
            debug!(
                user_id = %prefs.user_id,
                positive_count = positives.len(),
                explicit = prefs.explicit.any(),
                "Content scores computed"
            );
            return ContentRanking {
                candidates: positives,
                popularity_fallback: false,
            };
        }

        let mut by_popularity: Vec<ScoredTrip> = eligible
            .into_iter()
            .map(|trip| ScoredTrip::new(trip.clone(), trip.popularity(), RecallSource::Content))
            .collect();
        by_popularity.sort_by(|a, b| score_desc(a.score, b.score));

        ContentRanking {
            candidates: by_popularity,
            popularity_fallback: true,
        }
    }
}
