use super::{RecallContext, RecallSource, RecallStrategy, Result};
use crate::models::{ScoredTrip, Trip};
use crate::services::matrix_factorization::{FactorizationError, MfModelCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Matrix-factorization recall over the shared model cache.
///
/// Known users: rank unseen, non-owned trips by `Y[item] · X[user]`.
/// Users the model never saw: rank by raw interaction count.
pub struct MatrixFactorizationRecallStrategy {
    cache: Arc<MfModelCache>,
}

impl MatrixFactorizationRecallStrategy {
    pub fn new(cache: Arc<MfModelCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RecallStrategy for MatrixFactorizationRecallStrategy {
    async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
        let model = match self.cache.get_or_rebuild(&ctx.trips).await {
            Ok(model) => model,
            Err(FactorizationError::EmptyInteractions) => {
                info!(user_id = %ctx.user_id(), "MF recall: corpus has no interactions");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(item_scores) = model.score_items(ctx.user_id()) else {
            info!(
                user_id = %ctx.user_id(),
                "MF recall: unseen user, using popularity proxy"
            );
            return Ok(ctx.popularity_ranking(RecallSource::MatrixFactorization, |t: &Trip| {
                t.interaction_count() as f64
            }));
        };

        let seen = ctx.index.trips_of(ctx.user_id());
        let scores: HashMap<String, f64> = item_scores
            .into_iter()
            .filter(|(trip_id, _)| {
                !ctx.interacted.contains(*trip_id) && !seen.is_some_and(|s| s.contains(*trip_id))
            })
            .filter(|(trip_id, _)| ctx.trip(trip_id).is_some_and(|t| ctx.is_eligible(t)))
            .map(|(trip_id, score)| (trip_id.to_string(), score))
            .collect();

        let candidates = ctx.rank_scores(scores, RecallSource::MatrixFactorization);

        info!(
            user_id = %ctx.user_id(),
            factors = model.factors(),
            count = candidates.len(),
            "MF recall completed"
        );

        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::MatrixFactorization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MfConfig;
    use crate::models::UserProfile;
    use chrono::Utc;

    fn context(user: &str, trips: Vec<Trip>) -> RecallContext {
        let profile = UserProfile {
            user_id: user.to_string(),
            ..Default::default()
        };
        RecallContext::new(&profile, Arc::new(trips), 10, Utc::now())
    }

    fn strategy() -> MatrixFactorizationRecallStrategy {
        let cache = MfModelCache::new(MfConfig {
            factors: 4,
            iter: 5,
            ..Default::default()
        });
        MatrixFactorizationRecallStrategy::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn test_known_user_skips_seen_and_owned() {
        let trips = vec![
            Trip::new("liked", "o").with_likes(&["me", "peer"]),
            Trip::new("peer_pick", "o").with_likes(&["peer"]),
            Trip::new("mine", "me").with_likes(&["peer"]),
        ];

        let result = strategy().recall(&context("me", trips)).await.unwrap();

        let ids: Vec<&str> = result.iter().map(|s| s.trip.id.as_str()).collect();
        assert_eq!(ids, vec!["peer_pick"]);
    }

    #[tokio::test]
    async fn test_unseen_user_gets_popularity_proxy() {
        let trips = vec![
            Trip::new("quiet", "o"),
            Trip::new("busy", "o").with_likes(&["x", "y"]),
        ];

        let result = strategy().recall(&context("newbie", trips)).await.unwrap();

        assert_eq!(result[0].trip.id, "busy");
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_empty() {
        let result = strategy().recall(&context("me", Vec::new())).await.unwrap();
        assert!(result.is_empty());
    }
}
