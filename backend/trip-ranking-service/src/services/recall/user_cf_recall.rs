use super::{RecallContext, RecallSource, RecallStrategy, Result};
use crate::config::CfConfig;
use crate::models::{ScoredTrip, Trip};
use crate::utils::{jaccard, score_desc};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// User-based Collaborative Filtering Recall Strategy
///
/// Algorithm:
/// 1. Requester trips = owned + liked/saved (index) + profile interactions
/// 2. Similarity to every other user = Jaccard(requester trips, their trips),
///    plus a bonus when followed. Users below the overlap floor are skipped.
/// 3. Keep the top-N neighbors and sum their similarities per candidate trip
///
/// No requester trips: rank by raw `|likes| + |savedBy|`.
/// No qualifying neighbors: empty list.
pub struct UserCFRecallStrategy {
    config: CfConfig,
}

impl UserCFRecallStrategy {
    pub fn new(config: CfConfig) -> Self {
        Self { config }
    }

    /// Overlap floor. At least one shared trip is always required, so
    /// fully disjoint users never become neighbors.
    fn min_overlap(&self) -> usize {
        self.config.min_overlap.max(1)
    }

    /// Neighbors ordered by similarity descending, then user id
    pub fn neighbors<'a>(
        &self,
        ctx: &'a RecallContext,
        requester_trips: &HashSet<&'a str>,
    ) -> Vec<(&'a str, f64)> {
        let mut neighbors: Vec<(&str, f64)> = ctx
            .index
            .user_to_trips()
            .iter()
            .filter(|(user, _)| user.as_str() != ctx.user_id())
            .filter_map(|(user, trips)| {
                let trips: HashSet<&str> = trips.iter().map(String::as_str).collect();
                let overlap = trips.intersection(requester_trips).count();
                if overlap < self.min_overlap() {
                    return None;
                }

                let mut similarity = jaccard(requester_trips, &trips);
                if ctx.preferences.followings.contains(user.as_str()) {
                    similarity += self.config.follow_bonus;
                }
                Some((user.as_str(), similarity))
            })
            .collect();

        neighbors.sort_by(|a, b| score_desc(a.1, b.1).then_with(|| a.0.cmp(b.0)));
        neighbors.truncate(self.config.max_neighbors);
        neighbors
    }
}

#[async_trait]
impl RecallStrategy for UserCFRecallStrategy {
    async fn recall(&self, ctx: &RecallContext) -> Result<Vec<ScoredTrip>> {
        let mut requester_trips: HashSet<&str> = ctx
            .index
            .trips_of(ctx.user_id())
            .map(|trips| trips.iter().map(String::as_str).collect())
            .unwrap_or_default();
        requester_trips.extend(ctx.interacted.iter().map(String::as_str));

        if requester_trips.is_empty() {
            info!(
                user_id = %ctx.user_id(),
                "User-CF recall: no interactions, ranking by raw interaction count"
            );
            return Ok(ctx.popularity_ranking(RecallSource::UserCF, |t: &Trip| {
                t.interaction_count() as f64
            }));
        }

        let neighbors = self.neighbors(ctx, &requester_trips);
        if neighbors.is_empty() {
            info!(user_id = %ctx.user_id(), "User-CF recall: no qualifying neighbors");
            return Ok(Vec::new());
        }

        let mut scores: HashMap<String, f64> = HashMap::new();
        for (user, similarity) in &neighbors {
            let Some(trips) = ctx.index.trips_of(user) else {
                continue;
            };
            for trip_id in trips {
                if requester_trips.contains(trip_id.as_str()) {
                    continue;
                }
                match ctx.trip(trip_id) {
                    Some(trip) if ctx.is_eligible(trip) => {
                        *scores.entry(trip_id.clone()).or_insert(0.0) += similarity;
                    }
                    _ => {}
                }
            }
        }

        let candidates = ctx.rank_scores(scores, RecallSource::UserCF);

        info!(
            user_id = %ctx.user_id(),
            neighbors = neighbors.len(),
            count = candidates.len(),
            "User-CF recall completed"
        );

        Ok(candidates)
    }

    fn source(&self) -> RecallSource {
        RecallSource::UserCF
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;
    use chrono::Utc;
    use std::sync::Arc;

    fn context(user: &str, followings: &[&str], trips: Vec<Trip>) -> RecallContext {
        let profile = UserProfile {
            user_id: user.to_string(),
            followings: followings.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        };
        RecallContext::new(&profile, Arc::new(trips), 10, Utc::now())
    }

    #[tokio::test]
    async fn test_neighbor_trips_are_recommended() {
        let trips = vec![
            Trip::new("t1", "o").with_likes(&["me", "n1"]),
            Trip::new("t2", "o").with_likes(&["n1"]),
            Trip::new("t3", "o").with_likes(&["n1", "n2"]),
        ];
        let strategy = UserCFRecallStrategy::new(CfConfig::default());

        let result = strategy.recall(&context("me", &[], trips)).await.unwrap();

        let ids: Vec<&str> = result.iter().map(|s| s.trip.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3"]);
    }

    #[tokio::test]
    async fn test_disjoint_users_are_never_neighbors() {
        let trips = vec![
            Trip::new("a1", "owner-a").with_likes(&["me"]),
            Trip::new("b1", "owner-b").with_likes(&["stranger"]),
        ];
        let ctx = context("me", &["stranger"], trips);
        let strategy = UserCFRecallStrategy::new(CfConfig {
            min_overlap: 0,
            ..Default::default()
        });

        let requester: HashSet<&str> = ["a1"].into_iter().collect();
        let neighbors = strategy.neighbors(&ctx, &requester);
        let result = strategy.recall(&ctx).await.unwrap();

        assert!(neighbors.iter().all(|(u, _)| *u != "stranger"));
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_neighbors_are_truncated_to_max() {
        let trips = vec![
            Trip::new("shared", "o").with_likes(&["me", "a", "b"]),
            Trip::new("from_a", "o").with_likes(&["a"]),
            Trip::new("from_b", "o").with_likes(&["b"]),
        ];
        let ctx = context("me", &[], trips);
        let strategy = UserCFRecallStrategy::new(CfConfig {
            max_neighbors: 1,
            ..Default::default()
        });

        let requester: HashSet<&str> = ["shared"].into_iter().collect();
        let neighbors = strategy.neighbors(&ctx, &requester);
        let result = strategy.recall(&ctx).await.unwrap();

        assert_eq!(neighbors, vec![("a", 0.5)]);
        let ids: Vec<&str> = result.iter().map(|s| s.trip.id.as_str()).collect();
        assert_eq!(ids, vec!["from_a"]);
    }

    #[tokio::test]
    async fn test_min_overlap_above_one() {
        let trips = vec![
            Trip::new("s1", "o1").with_likes(&["me", "a", "b"]),
            Trip::new("s2", "o2").with_likes(&["me", "a"]),
            Trip::new("a_only", "o3").with_likes(&["a"]),
            Trip::new("b_only", "o4").with_likes(&["b"]),
        ];
        let ctx = context("me", &[], trips);
        let strategy = UserCFRecallStrategy::new(CfConfig {
            min_overlap: 2,
            ..Default::default()
        });

        let result = strategy.recall(&ctx).await.unwrap();

        let ids: Vec<&str> = result.iter().map(|s| s.trip.id.as_str()).collect();
        assert_eq!(ids, vec!["a_only"]);
    }

    #[tokio::test]
    async fn test_no_neighbor_meets_min_overlap() {
        let trips = vec![
            Trip::new("s1", "o").with_likes(&["me", "a"]),
            Trip::new("a_only", "o").with_likes(&["a"]),
        ];
        let strategy = UserCFRecallStrategy::new(CfConfig {
            min_overlap: 2,
            max_neighbors: 1,
            ..Default::default()
        });

        let result = strategy.recall(&context("me", &[], trips)).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_by_raw_interaction_count() {
        let trips = vec![
            Trip::new("a", "o").with_likes(&["x"]),
            Trip::new("b", "o").with_likes(&["x"]).with_saved_by(&["y", "z"]),
        ];
        let strategy = UserCFRecallStrategy::new(CfConfig::default());

        let result = strategy.recall(&context("me", &[], trips)).await.unwrap();

        assert_eq!(result[0].trip.id, "b");
        assert_eq!(result[0].score, 3.0);
    }

    #[tokio::test]
    async fn test_follow_bonus_reorders_neighbors() {
        let trips = vec![
            Trip::new("shared", "o").with_likes(&["me", "a", "b"]),
            Trip::new("from_a", "o").with_likes(&["a"]),
            Trip::new("from_b", "o").with_likes(&["b"]),
        ];
        let ctx = context("me", &["b"], trips);
        let strategy = UserCFRecallStrategy::new(CfConfig::default());

        let result = strategy.recall(&ctx).await.unwrap();

        assert_eq!(result[0].trip.id, "from_b");
    }
}
