mod content_recall;
mod item_cf_recall;
mod mf_recall;
mod user_cf_recall;

use crate::models::{RecallSource, ResolvedPreferences, ScoredTrip, Trip, UserProfile};
use crate::services::interaction::{infer_user_interactions, InteractionIndex};
use crate::services::matrix_factorization::FactorizationError;
use crate::services::ranking::RankingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};

pub use content_recall::ContentRecallStrategy;
pub use item_cf_recall::ItemCFRecallStrategy;
pub use mf_recall::MatrixFactorizationRecallStrategy;
pub use user_cf_recall::UserCFRecallStrategy;

#[derive(Debug, Error)]
pub enum RecallError {
    #[error("Factorization failed: {0}")]
    Factorization(#[from] FactorizationError),

    #[error("Ranking failed: {0}")]
    Ranking(#[from] RankingError),

    #[error("Invalid candidate data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, RecallError>;

/// Recall 策略特徵
#[async_trait]
pub trait RecallStrategy: Send + Sync {
    async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>>;
    fn source(&self) -> RecallSource;
}

/// Read-only request state shared by every strategy
pub struct RecallContext {
    pub preferences: ResolvedPreferences,
    pub trips: Arc<Vec<Trip>>,
    pub index: InteractionIndex,
    /// Liked/saved ids from the profile, or inferred from the corpus when absent
    pub interacted: HashSet<String>,
    pub top_k: usize,
    pub now: DateTime<Utc>,
    positions: HashMap<String, usize>,
}

impl RecallContext {
    pub fn new(
        profile: &UserProfile,
        trips: Arc<Vec<Trip>>,
        top_k: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let preferences = ResolvedPreferences::from_profile(profile);
        let index = InteractionIndex::build(&trips);

        let mut interacted: HashSet<String> = preferences
            .liked
            .iter()
            .chain(preferences.saved.iter())
            .cloned()
            .collect();
        if interacted.is_empty() {
            interacted = infer_user_interactions(&preferences.user_id, &trips);
        }

        let mut positions = HashMap::with_capacity(trips.len());
        for (i, trip) in trips.iter().enumerate() {
            positions.entry(trip.id.clone()).or_insert(i);
        }

        Self {
            preferences,
            trips,
            index,
            interacted,
            top_k,
            now,
            positions,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.preferences.user_id
    }

    /// First trip in the corpus with this id
    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.positions.get(trip_id).map(|&i| &self.trips[i])
    }

    /// Corpus position, used to keep ties in corpus order
    pub fn position(&self, trip_id: &str) -> usize {
        self.positions.get(trip_id).copied().unwrap_or(usize::MAX)
    }

    pub fn is_eligible(&self, trip: &Trip) -> bool {
        !trip.is_owned_by(self.user_id())
    }

    /// Eligible trips ranked by `key` descending, corpus order on ties, top-K
    pub fn popularity_ranking<F>(&self, source: RecallSource, key: F) -> Vec<ScoredTrip>
    where
        F: Fn(&Trip) -> f64,
    {
        let mut ranked: Vec<ScoredTrip> = self
            .trips
            .iter()
            .filter(|t| self.is_eligible(t))
            .map(|t| ScoredTrip::new(t.clone(), key(t), source))
            .collect();
        ranked.sort_by(|a, b| crate::utils::score_desc(a.score, b.score));
        ranked.truncate(self.top_k);
        ranked
    }

    /// Turn accumulated `(trip id, score)` pairs into a ranked top-K list.
    /// Ties fall back to corpus order.
    pub fn rank_scores(
        &self,
        scores: HashMap<String, f64>,
        source: RecallSource,
    ) -> Vec<ScoredTrip> {
        let mut scored: Vec<(String, f64)> = scores.into_iter().collect();
        scored.sort_by(|a, b| {
            crate::utils::score_desc(a.1, b.1)
                .then_with(|| self.position(&a.0).cmp(&self.position(&b.0)))
        });

        scored
            .into_iter()
            .filter_map(|(id, score)| {
                self.trip(&id)
                    .map(|trip| ScoredTrip::new(trip.clone(), score, source))
            })
            .take(self.top_k)
            .collect()
    }
}

/// Result of one isolated strategy run
#[derive(Debug)]
pub enum StrategyOutcome {
    Ranked(Vec<ScoredTrip>),
    Failed(RecallError),
    Panicked(JoinError),
}

impl StrategyOutcome {
    pub fn from_join(
        joined: std::result::Result<Result<Vec<ScoredTrip>>, JoinError>,
    ) -> Self {
        match joined {
            Ok(Ok(ranked)) => StrategyOutcome::Ranked(ranked),
            Ok(Err(e)) => StrategyOutcome::Failed(e),
            Err(e) => StrategyOutcome::Panicked(e),
        }
    }

    /// Failures degrade to an empty list for that strategy only
    pub fn into_ranked(self, source: RecallSource) -> Vec<ScoredTrip> {
        match self {
            StrategyOutcome::Ranked(ranked) => ranked,
            StrategyOutcome::Failed(e) => {
                warn!(strategy = source.as_str(), error = %e, "Recall strategy failed");
                Vec::new()
            }
            StrategyOutcome::Panicked(e) => {
                warn!(strategy = source.as_str(), error = %e, "Recall strategy panicked");
                Vec::new()
            }
        }
    }
}

/// Recall 層：多策略並行召回
pub struct RecallLayer {
    strategies: Vec<Arc<dyn RecallStrategy>>,
}

impl RecallLayer {
    pub fn new(strategies: Vec<Arc<dyn RecallStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run every strategy on its own task; one failing never aborts the others
    pub async fn recall_all(
        &self,
        ctx: Arc<RecallContext>,
    ) -> HashMap<RecallSource, Vec<ScoredTrip>> {
        let (sources, handles): (Vec<RecallSource>, Vec<_>) = self
            .strategies
            .iter()
            .map(|strategy| {
                let strategy = Arc::clone(strategy);
                let ctx = Arc::clone(&ctx);
                let source = strategy.source();
                let handle = tokio::spawn(async move { strategy.recall(&ctx).await });
                (source, handle)
            })
            .unzip();

        let joined = futures::future::join_all(handles).await;

        let mut results = HashMap::with_capacity(sources.len());
        for (source, outcome) in sources.into_iter().zip(joined) {
            let ranked = StrategyOutcome::from_join(outcome).into_ranked(source);
            info!(
                user_id = %ctx.user_id(),
                strategy = source.as_str(),
                count = ranked.len(),
                "Recall strategy completed"
            );
            results.insert(source, ranked);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStrategy;

    #[async_trait]
    impl RecallStrategy for FailingStrategy {
        async fn recall(&self, _ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
            Err(RecallError::InvalidData("boom".to_string()))
        }

        fn source(&self) -> RecallSource {
            RecallSource::UserCF
        }
    }

    struct PanickingStrategy;

    #[async_trait]
    impl RecallStrategy for PanickingStrategy {
        async fn recall(&self, _ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
            panic!("strategy bug");
        }

        fn source(&self) -> RecallSource {
            RecallSource::ItemCF
        }
    }

    struct FixedStrategy;

    #[async_trait]
    impl RecallStrategy for FixedStrategy {
        async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
            Ok(ctx.popularity_ranking(RecallSource::Content, Trip::popularity))
        }

        fn source(&self) -> RecallSource {
            RecallSource::Content
        }
    }

    fn context(user: &str, trips: Vec<Trip>) -> RecallContext {
        let profile = UserProfile {
            user_id: user.to_string(),
            ..Default::default()
        };
        RecallContext::new(&profile, Arc::new(trips), 10, Utc::now())
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let layer = RecallLayer::new(vec![
            Arc::new(FailingStrategy),
            Arc::new(PanickingStrategy),
            Arc::new(FixedStrategy),
        ]);
        let ctx = Arc::new(context("me", vec![Trip::new("t1", "other")]));

        let results = layer.recall_all(ctx).await;

        assert!(results[&RecallSource::UserCF].is_empty());
        assert!(results[&RecallSource::ItemCF].is_empty());
        assert_eq!(results[&RecallSource::Content].len(), 1);
    }

    #[test]
    fn test_interactions_inferred_when_profile_has_none() {
        let trips = vec![
            Trip::new("t1", "o").with_likes(&["me"]),
            Trip::new("t2", "o"),
        ];

        let ctx = context("me", trips);

        assert_eq!(ctx.interacted.len(), 1);
        assert!(ctx.interacted.contains("t1"));
    }

    #[test]
    fn test_popularity_ranking_keeps_corpus_order_on_ties() {
        let trips = vec![
            Trip::new("a", "o"),
            Trip::new("b", "o").with_likes(&["x"]),
            Trip::new("c", "o"),
            Trip::new("mine", "me").with_likes(&["x", "y"]),
        ];
        let ctx = context("me", trips);

        let ranked = ctx.popularity_ranking(RecallSource::ItemCF, |t| {
            t.interaction_count() as f64
        });

        let ids: Vec<&str> = ranked.iter().map(|s| s.trip.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
