// ============================================
// Rank Fusion (混合排序)
// ============================================
//
// Weighted positional fusion of the content, user-CF and item-CF lists.
// Element i of a list of length n contributes 1 - i/(n+1); content weighs 1,
// the CF lists weigh per config. Missing from a list contributes 0.

use crate::config::FusionConfig;
use crate::models::{RecallSource, ScoredTrip, Trip};
use crate::utils::score_desc;
use std::collections::HashMap;

pub struct RankFusion {
    user_cf_weight: f64,
    item_cf_weight: f64,
}

impl RankFusion {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            user_cf_weight: config.user_cf_weight,
            item_cf_weight: config.item_cf_weight,
        }
    }

    /// `1 - i / (n + 1)` for 0-indexed position `i` in a list of length `n`
    pub fn positional_score(position: usize, len: usize) -> f64 {
        1.0 - position as f64 / (len + 1) as f64
    }

    /// Fuse the three lists, best first, truncated to `top_k`.
    /// The first document seen for an id is the one returned.
    pub fn fuse(
        &self,
        content: &[ScoredTrip],
        user_cf: &[ScoredTrip],
        item_cf: &[ScoredTrip],
        top_k: usize,
    ) -> Vec<ScoredTrip> {
        let mut order: Vec<&Trip> = Vec::new();
        let mut totals: HashMap<&str, f64> = HashMap::new();

        for (list, weight) in [
            (content, 1.0),
            (user_cf, self.user_cf_weight),
            (item_cf, self.item_cf_weight),
        ] {
            let len = list.len();
            for (i, scored) in list.iter().enumerate() {
                let id = scored.trip.id.as_str();
                let total = totals.entry(id).or_insert_with(|| {
                    order.push(&scored.trip);
                    0.0
                });
                *total += weight * Self::positional_score(i, len);
            }
        }

        let mut fused: Vec<ScoredTrip> = order
            .into_iter()
            .map(|trip| {
                let score = totals.get(trip.id.as_str()).copied().unwrap_or(0.0);
                ScoredTrip::new(trip.clone(), score, RecallSource::Hybrid)
            })
            .collect();

        // stable: ties keep first-seen order
        fused.sort_by(|a, b| score_desc(a.score, b.score));
        fused.truncate(top_k);
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str], source: RecallSource) -> Vec<ScoredTrip> {
        ids.iter()
            .map(|id| ScoredTrip::new(Trip::new(*id, "o"), 0.0, source))
            .collect()
    }

    #[test]
    fn test_exact_sum_of_positional_terms() {
        let fusion = RankFusion::new(&FusionConfig::default());
        let content = list(&["a", "b", "c"], RecallSource::Content);
        let user_cf = list(&["x", "a"], RecallSource::UserCF);
        let item_cf = list(&["a"], RecallSource::ItemCF);

        let fused = fusion.fuse(&content, &user_cf, &item_cf, 10);

        let a = fused.iter().find(|s| s.trip.id == "a").unwrap();
        let expected = (1.0 - 0.0 / 4.0) + 0.8 * (1.0 - 1.0 / 3.0) + 0.6 * (1.0 - 0.0 / 2.0);
        assert!((a.score - expected).abs() < 1e-12);

        let x = fused.iter().find(|s| s.trip.id == "x").unwrap();
        assert!((x.score - 0.8).abs() < 1e-12);

        assert_eq!(fused[0].trip.id, "a");
        assert!(fused.iter().all(|s| s.source == RecallSource::Hybrid));
    }

    #[test]
    fn test_first_seen_document_wins() {
        let fusion = RankFusion::new(&FusionConfig::default());
        let content = vec![ScoredTrip::new(
            Trip::new("a", "o").with_destination("Bali"),
            0.0,
            RecallSource::Content,
        )];
        let user_cf = vec![ScoredTrip::new(
            Trip::new("a", "o").with_destination("Elsewhere"),
            0.0,
            RecallSource::UserCF,
        )];

        let fused = fusion.fuse(&content, &user_cf, &[], 10);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].trip.destination(), Some("Bali"));
    }

    #[test]
    fn test_truncates_and_handles_empty_lists() {
        let fusion = RankFusion::new(&FusionConfig::default());
        let content = list(&["a", "b", "c", "d"], RecallSource::Content);

        assert_eq!(fusion.fuse(&content, &[], &[], 2).len(), 2);
        assert!(fusion.fuse(&[], &[], &[], 10).is_empty());
    }
}
