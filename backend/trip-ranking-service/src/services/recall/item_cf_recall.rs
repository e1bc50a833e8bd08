use super::{RecallContext, RecallSource, RecallStrategy, Result};
use crate::config::CfConfig;
use crate::models::{ResolvedPreferences, ScoredTrip, Trip};
use crate::utils::{budget_similarity, id_tie_break, jaccard};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

/// Item-based Collaborative Filtering Recall Strategy
///
/// Algorithm:
/// 1. Collect the user's interacted trips (profile, else inferred from the corpus)
/// 2. Gather neighbor users who touched any of those trips
/// 3. Co-occurrence: every trip a neighbor touched earns the neighbor's damped
///    weight times a preference boost
/// 4. No neighbors: classic pairwise Jaccard over interacting-user sets
///
/// Both paths multiply by a log popularity prior and add a stable id-derived
/// tie-break. An empty signal set falls back to popularity by interacting users.
pub struct ItemCFRecallStrategy {
    config: CfConfig,
}

/// Preference boost increments
const BOOST_STYLE: f64 = 0.3;
const BOOST_DESTINATION: f64 = 0.25;
const BOOST_TAG_OVERLAP: f64 = 0.2;
const BOOST_BUDGET: f64 = 0.15;
/// Budget similarity counted as "close"
const BUDGET_CLOSE_THRESHOLD: f64 = 0.7;
/// Scale of the id-derived tie-break
const TIE_BREAK_SCALE: f64 = 1e-6;

impl ItemCFRecallStrategy {
    pub fn new(config: CfConfig) -> Self {
        Self { config }
    }

    fn popularity_prior(&self, ctx: &RecallContext, trip_id: &str) -> f64 {
        1.0 + self.config.popularity_weight * ((ctx.index.trip_degree(trip_id) + 1) as f64).log10()
    }

    /// `1 / (1 + damping * log10(|userToTrips[u]| + 1))`, times the follow bonus
    fn neighbor_weight(&self, ctx: &RecallContext, user: &str) -> f64 {
        let activity = ((ctx.index.user_degree(user) + 1) as f64).log10();
        let damp = 1.0 / (1.0 + self.config.user_damping * activity);
        if ctx.preferences.followings.contains(user) {
            damp * (1.0 + self.config.follow_bonus)
        } else {
            damp
        }
    }

    fn is_candidate(&self, ctx: &RecallContext, trip: &Trip) -> bool {
        ctx.is_eligible(trip) && !ctx.interacted.contains(&trip.id)
    }

    fn co_occurrence_scores(
        &self,
        ctx: &RecallContext,
        neighbors: &[&String],
    ) -> HashMap<String, f64> {
        let mut scores: HashMap<String, f64> = HashMap::new();

        for &user in neighbors {
            let weight = self.neighbor_weight(ctx, user);
            let Some(trips) = ctx.index.trips_of(user) else {
                continue;
            };

            let mut trips: Vec<&String> = trips.iter().collect();
            trips.sort();

            for trip_id in trips {
                let Some(trip) = ctx.trip(trip_id) else {
                    continue;
                };
                if !self.is_candidate(ctx, trip) {
                    continue;
                }
                *scores.entry(trip_id.clone()).or_insert(0.0) +=
                    weight * preference_boost(&ctx.preferences, trip);
            }
        }

        for (trip_id, score) in scores.iter_mut() {
            *score = *score * self.popularity_prior(ctx, trip_id)
                + id_tie_break(trip_id, TIE_BREAK_SCALE);
        }

        scores
    }

    fn classic_scores(&self, ctx: &RecallContext) -> HashMap<String, f64> {
        let mut seeds: Vec<&String> = ctx.interacted.iter().collect();
        seeds.sort();

        let mut scores = HashMap::new();

        for candidate in ctx.trips.iter().filter(|t| self.is_candidate(ctx, t)) {
            let Some(candidate_users) = ctx.index.users_of(&candidate.id) else {
                continue;
            };
            if candidate_users.is_empty() {
                continue;
            }

            let total: f64 = seeds
                .iter()
                .filter_map(|seed| ctx.index.users_of(seed))
                .filter(|users| !users.is_empty())
                .map(|users| jaccard(users, candidate_users))
                .sum();

            if total <= 0.0 {
                continue;
            }

            let score = total * self.popularity_prior(ctx, &candidate.id)
                + id_tie_break(&candidate.id, TIE_BREAK_SCALE);
            scores.insert(candidate.id.clone(), score);
        }

        scores
    }

    fn popularity_fallback(&self, ctx: &RecallContext) -> Vec<ScoredTrip> {
        ctx.popularity_ranking(RecallSource::ItemCF, |t| ctx.index.trip_degree(&t.id) as f64)
    }
}

/// `1 +` fixed increments for style, destination, tag overlap and budget closeness
pub fn preference_boost(prefs: &ResolvedPreferences, trip: &Trip) -> f64 {
    let mut boost = 1.0;

    if prefs.style_matches(trip) {
        boost += BOOST_STYLE;
    }

    if let Some(dest) = trip.destination() {
        if prefs.destinations.contains_key(dest) || prefs.favorite_destinations.contains(dest) {
            boost += BOOST_DESTINATION;
        }
    }

    if trip.tags.iter().any(|t| prefs.tags.contains_key(t)) {
        boost += BOOST_TAG_OVERLAP;
    }

    if budget_similarity(prefs.budget, trip.budget()) >= BUDGET_CLOSE_THRESHOLD {
        boost += BOOST_BUDGET;
    }

    boost
}

#[async_trait]
impl RecallStrategy for ItemCFRecallStrategy {
    async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
        if ctx.interacted.is_empty() {
            info!(
                user_id = %ctx.user_id(),
                "Item-CF recall: no interactions, using popularity fallback"
            );
            return Ok(self.popularity_fallback(ctx));
        }

        let mut neighbors: Vec<&String> = ctx
            .interacted
            .iter()
            .filter_map(|t| ctx.index.users_of(t))
            .flatten()
            .filter(|u| u.as_str() != ctx.user_id())
            .collect();
        neighbors.sort();
        neighbors.dedup();

        let scores = if neighbors.is_empty() {
            debug!(user_id = %ctx.user_id(), "Item-CF recall: no neighbors, classic similarity");
            self.classic_scores(ctx)
        } else {
            debug!(
                user_id = %ctx.user_id(),
                neighbors = neighbors.len(),
                "Item-CF recall: co-occurrence scoring"
            );
            self.co_occurrence_scores(ctx, &neighbors)
        };

        if scores.is_empty() {
            info!(
                user_id = %ctx.user_id(),
                "Item-CF recall: nothing scored, using popularity fallback"
            );
            return Ok(self.popularity_fallback(ctx));
        }

        let candidates = ctx.rank_scores(scores, RecallSource::ItemCF);

        info!(
            user_id = %ctx.user_id(),
            seeds = ctx.interacted.len(),
            count = candidates.len(),
            "Item-CF recall completed"
        );

        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::ItemCF
    }
}
