use super::features::{
    FeatureExtractor, BUDGET_SIMILARITY, RECENT_DEST_WEIGHT, TAG_OVERLAP_WEIGHTED,
    TRAVEL_STYLE_MATCH,
};
use super::model::ModelStore;
use super::{RankingError, Result};
use crate::config::RerankerConfig;
use crate::models::{RecallSource, ScoredTrip, Trip};
use crate::services::recall::RecallContext;
use crate::utils::score_desc;
use ndarray::{Array1, Array2};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Supervised reranker: model base score plus a blended preference signal.
///
/// `final = base + α · pref`, where
/// `pref = wTag·tag/maxTag + wStyle·style + wBudget·budget + wDest·dest/maxDest`
pub struct SupervisedReranker {
    config: RerankerConfig,
    store: Arc<dyn ModelStore>,
}

impl SupervisedReranker {
    pub fn new(config: RerankerConfig, store: Arc<dyn ModelStore>) -> Self {
        Self { config, store }
    }

    /// `max(2K, min_pool_size)`
    pub fn pool_target(&self, top_k: usize) -> usize {
        (2 * top_k).max(self.config.min_pool_size)
    }

    /// Deduplicated union of the given lists, backfilled from the eligible
    /// corpus (in corpus order) up to the pool target.
    pub fn build_pool(&self, ctx: &RecallContext, lists: &[&[ScoredTrip]]) -> Vec<Trip> {
        let target = self.pool_target(ctx.top_k);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pool: Vec<Trip> = Vec::with_capacity(target);

        for scored in lists.iter().flat_map(|list| list.iter()) {
            if seen.insert(scored.trip.id.as_str()) {
                pool.push(scored.trip.clone());
            }
        }

        let seeded = pool.len();
        for trip in ctx.trips.iter() {
            if pool.len() >= target {
                break;
            }
            if ctx.is_eligible(trip) && seen.insert(trip.id.as_str()) {
                pool.push(trip.clone());
            }
        }

        debug!(
            user_id = %ctx.user_id(),
            seeded,
            backfilled = pool.len() - seeded,
            "Reranker candidate pool built"
        );

        pool
    }

    /// Preference signal per row. Tag and destination weights are divided by
    /// their pool maximum, which defaults to 1 when no value is positive.
    pub fn preference_signal(&self, features: &Array2<f32>) -> Array1<f64> {
        let pool_max = |col: usize| {
            let max = features
                .column(col)
                .iter()
                .fold(f64::NEG_INFINITY, |acc, v| acc.max(*v as f64));
            if max > 0.0 {
                max
            } else {
                1.0
            }
        };
        let tag_max = pool_max(TAG_OVERLAP_WEIGHTED);
        let dest_max = pool_max(RECENT_DEST_WEIGHT);

        Array1::from_iter(features.rows().into_iter().map(|row| {
            self.config.pref_w_tag * (row[TAG_OVERLAP_WEIGHTED] as f64 / tag_max)
                + self.config.pref_w_style * row[TRAVEL_STYLE_MATCH] as f64
                + self.config.pref_w_budget * row[BUDGET_SIMILARITY] as f64
                + self.config.pref_w_dest * (row[RECENT_DEST_WEIGHT] as f64 / dest_max)
        }))
    }

    /// Score the pool and return the top-K. No deployed model is not an
    /// error: the result is simply empty.
    pub fn rerank(&self, ctx: &RecallContext, pool: &[Trip]) -> Result<Vec<ScoredTrip>> {
        let Some(loaded) = self.store.load()? else {
            info!(user_id = %ctx.user_id(), "Reranker: no model loaded");
            return Ok(Vec::new());
        };

        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let features = FeatureExtractor::new(&ctx.preferences, ctx.now).build_matrix(pool)?;
        let base = loaded.model.predict(&features)?;
        if base.len() != pool.len() {
            return Err(RankingError::InferenceError(format!(
                "model returned {} scores for {} candidates",
                base.len(),
                pool.len()
            )));
        }

        let preference = self.preference_signal(&features);

        let mut ranked: Vec<ScoredTrip> = pool
            .iter()
            .zip(base.iter().zip(preference.iter()))
            .map(|(trip, (base, pref))| {
                let score = *base as f64 + self.config.pref_alpha * pref;
                ScoredTrip::new(trip.clone(), score, RecallSource::Reranker)
            })
            .collect();

        ranked.sort_by(|a, b| score_desc(a.score, b.score));
        ranked.truncate(ctx.top_k);

        info!(
            user_id = %ctx.user_id(),
            kind = ?loaded.kind,
            pool = pool.len(),
            count = ranked.len(),
            "Reranker completed"
        );

        Ok(ranked)
    }
}
