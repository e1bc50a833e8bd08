use super::{RecallContext, RecallSource, RecallStrategy, Result};
use crate::config::ContentConfig;
use crate::models::ScoredTrip;
use crate::services::content::ContentScorer;
use crate::services::diversity::DiversityLayer;
use async_trait::async_trait;
use tracing::{info, warn};

/// Content-based recall: preference scoring followed by MMR diversification.
/// Falls back to plain popularity order when nothing matches the profile.
pub struct ContentRecallStrategy {
    scorer: ContentScorer,
    diversity: DiversityLayer,
}

impl ContentRecallStrategy {
    pub fn new(config: ContentConfig) -> Self {
        let diversity =
            DiversityLayer::with_destination_decay(config.mmr_lambda, config.dest_dup_decay);
        Self {
            scorer: ContentScorer::new(config),
            diversity,
        }
    }
}

#[async_trait]
impl RecallStrategy for ContentRecallStrategy {
    async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
        let ranking = self.scorer.rank(&ctx.preferences, &ctx.trips, ctx.now);

        if ranking.popularity_fallback {
            warn!(
                user_id = %ctx.user_id(),
                eligible = ranking.candidates.len(),
                "Content recall: no positive scores, using popularity fallback"
            );
            let mut candidates = ranking.candidates;
            candidates.truncate(ctx.top_k);
            return Ok(candidates);
        }

        let scored = ranking.candidates.len();
        let selected = self.diversity.rerank(ranking.candidates, ctx.top_k);

        info!(
            user_id = %ctx.user_id(),
            scored,
            selected = selected.len(),
            "Content recall: diversified"
        );

        Ok(selected)
    }

    fn source(&self) -> RecallSource {
        RecallSource::Content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawWeights, Trip, UserProfile};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_content_recall_excludes_own_and_respects_k() {
        let mut trips: Vec<Trip> = (0..30)
            .map(|i| Trip::new(format!("t{}", i), "other").with_tags(&["beach"]))
            .collect();
        trips.push(Trip::new("mine", "me").with_tags(&["beach"]));

        let profile = UserProfile {
            user_id: "me".to_string(),
            tags: Some(RawWeights::Map(HashMap::from([("beach".to_string(), 1.0)]))),
            ..Default::default()
        };
        let ctx = RecallContext::new(&profile, Arc::new(trips), 10, Utc::now());
        let strategy = ContentRecallStrategy::new(ContentConfig::default());

        let result = strategy.recall(&ctx).await.unwrap();

        assert_eq!(result.len(), 10);
        assert!(result.iter().all(|s| s.trip.id != "mine"));
        assert_eq!(strategy.source(), RecallSource::Content);
    }
}
