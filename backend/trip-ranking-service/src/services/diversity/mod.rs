use crate::models::{ScoredTrip, Trip};
use crate::utils::jaccard;
use std::collections::{HashMap, HashSet};

const TAG_SIMILARITY_WEIGHT: f64 = 0.7;
const DESTINATION_SIMILARITY_WEIGHT: f64 = 0.3;

/// Diversity Layer - 多樣性重排
/// 使用 MMR (Maximal Marginal Relevance) 算法
pub struct DiversityLayer {
    lambda: f64,            // 平衡 relevance 和 diversity 的參數（0~1）
    destination_decay: f64, // 每個重複目的地的懲罰
}

impl DiversityLayer {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            destination_decay: 0.0,
        }
    }

    /// Create with a per-repeat destination penalty
    pub fn with_destination_decay(lambda: f64, decay: f64) -> Self {
        Self {
            lambda,
            destination_decay: decay,
        }
    }

    /// 重排候選集以提高多樣性
    /// lambda = 1.0: 只看相關性
    /// lambda = 0.0: 只看多樣性
    /// lambda = 0.7: 平衡（推薦值）
    ///
    /// `candidates` must be score-descending. Ties go to the earliest candidate.
    pub fn rerank(&self, candidates: Vec<ScoredTrip>, top_k: usize) -> Vec<ScoredTrip> {
        let candidates = dedup_by_id(candidates);
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let selected = self.select(&candidates, top_k);

        let mut slots: Vec<Option<ScoredTrip>> = candidates.into_iter().map(Some).collect();
        selected
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }

    /// Indices of the chosen candidates, in selection order
    fn select(&self, candidates: &[ScoredTrip], top_k: usize) -> Vec<usize> {
        let tag_sets: Vec<HashSet<&str>> = candidates.iter().map(|c| c.trip.tag_set()).collect();
        let mut taken = vec![false; candidates.len()];
        let mut selected: Vec<usize> = Vec::with_capacity(top_k);
        let mut destination_counts: HashMap<&str, usize> = HashMap::new();

        // 以最高分候選作為種子
        taken[0] = true;
        selected.push(0);
        if let Some(dest) = candidates[0].trip.destination() {
            *destination_counts.entry(dest).or_insert(0) += 1;
        }

        // MMR 貪心選擇
        while selected.len() < top_k {
            let mut best: Option<(usize, f64)> = None;

            for (i, candidate) in candidates.iter().enumerate() {
                if taken[i] {
                    continue;
                }

                let max_similarity = selected
                    .iter()
                    .map(|&s| {
                        similarity(
                            &tag_sets[i],
                            &tag_sets[s],
                            &candidate.trip,
                            &candidates[s].trip,
                        )
                    })
                    .fold(0.0_f64, f64::max);

                let repeats = candidate
                    .trip
                    .destination()
                    .and_then(|d| destination_counts.get(d))
                    .copied()
                    .unwrap_or(0);

                let mmr_score = self.lambda * candidate.score
                    - (1.0 - self.lambda) * max_similarity
                    - self.destination_decay * repeats as f64;

                if best.map_or(true, |(_, score)| mmr_score > score) {
                    best = Some((i, mmr_score));
                }
            }

            let Some((idx, _)) = best else {
                break;
            };

            taken[idx] = true;
            selected.push(idx);
            if let Some(dest) = candidates[idx].trip.destination() {
                *destination_counts.entry(dest).or_insert(0) += 1;
            }
        }

        // 不足 K 時以剩餘高相關候選補齊
        if selected.len() < top_k {
            for i in 0..candidates.len() {
                if selected.len() >= top_k {
                    break;
                }
                if !taken[i] {
                    taken[i] = true;
                    selected.push(i);
                }
            }
        }

        selected
    }
}

/// `0.7 · Jaccard(tags) + 0.3 · [same destination]`
pub fn trip_similarity(a: &Trip, b: &Trip) -> f64 {
    similarity(&a.tag_set(), &b.tag_set(), a, b)
}

fn similarity(a_tags: &HashSet<&str>, b_tags: &HashSet<&str>, a: &Trip, b: &Trip) -> f64 {
    let same_destination = match (a.destination(), b.destination()) {
        (Some(x), Some(y)) if x == y => 1.0,
        _ => 0.0,
    };
    TAG_SIMILARITY_WEIGHT * jaccard(a_tags, b_tags)
        + DESTINATION_SIMILARITY_WEIGHT * same_destination
}

fn dedup_by_id(candidates: Vec<ScoredTrip>) -> Vec<ScoredTrip> {
    let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.trip.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecallSource;

    fn scored(id: &str, score: f64, tags: &[&str], dest: &str) -> ScoredTrip {
        let trip = Trip::new(id, "owner").with_tags(tags).with_destination(dest);
        ScoredTrip::new(trip, score, RecallSource::Content)
    }

    fn ids(trips: &[ScoredTrip]) -> Vec<&str> {
        trips.iter().map(|t| t.trip.id.as_str()).collect()
    }

    #[test]
    fn test_diversity_rerank_prefers_new_destination() {
        let layer = DiversityLayer::with_destination_decay(0.7, 0.15);

        let candidates = vec![
            scored("bali-1", 1.0, &["beach"], "Bali"),
            scored("bali-2", 0.95, &["beach"], "Bali"),
            scored("alps-1", 0.9, &["hiking"], "Alps"),
        ];

        let reranked = layer.rerank(candidates, 2);

        assert_eq!(ids(&reranked), vec!["bali-1", "alps-1"]);
    }

    #[test]
    fn test_lambda_one_is_pure_relevance() {
        let layer = DiversityLayer::new(1.0);

        let candidates = vec![
            scored("a", 3.0, &["beach"], "Bali"),
            scored("b", 2.0, &["beach"], "Bali"),
            scored("c", 1.0, &["hiking"], "Alps"),
        ];

        let reranked = layer.rerank(candidates, 3);

        assert_eq!(ids(&reranked), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let layer = DiversityLayer::new(0.7);

        let candidates = vec![
            scored("seed", 2.0, &["x"], "X"),
            scored("first", 1.0, &["y"], "Y"),
            scored("second", 1.0, &["z"], "Z"),
        ];

        let reranked = layer.rerank(candidates, 2);

        assert_eq!(ids(&reranked), vec!["seed", "first"]);
    }

    #[test]
    fn test_deterministic_and_bounded() {
        let layer = DiversityLayer::with_destination_decay(0.5, 0.15);
        let build = || {
            (0..20)
                .map(|i| {
                    let dest = if i % 3 == 0 { "Rome" } else { "Oslo" };
                    scored(&format!("t{}", i), 20.0 - i as f64, &["city"], dest)
                })
                .collect::<Vec<_>>()
        };

        let first = layer.rerank(build(), 10);
        let second = layer.rerank(build(), 10);

        assert_eq!(first.len(), 10);
        assert_eq!(ids(&first), ids(&second));
        let unique: HashSet<&str> = ids(&first).into_iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_duplicates_removed_and_short_input_returned_whole() {
        let layer = DiversityLayer::new(0.7);

        let candidates = vec![
            scored("a", 2.0, &[], "X"),
            scored("a", 1.5, &[], "X"),
            scored("b", 1.0, &[], "Y"),
        ];

        let reranked = layer.rerank(candidates, 10);

        assert_eq!(ids(&reranked), vec!["a", "b"]);
    }

    #[test]
    fn test_trip_similarity() {
        let a = Trip::new("a", "o").with_tags(&["beach", "surf"]).with_destination("Bali");
        let b = Trip::new("b", "o").with_tags(&["beach"]).with_destination("Bali");
        let c = Trip::new("c", "o");

        assert!((trip_similarity(&a, &b) - (0.7 * 0.5 + 0.3)).abs() < 1e-9);
        assert_eq!(trip_similarity(&c, &c), 0.0);
    }
}
