// Implicit-feedback ALS (Hu, Koren, Volinsky 2008).
//
// Every like, save or ownership is an observation with preference 1 and
// confidence c = 1 + alpha. Per iteration each user row solves
//
//   (YᵗY + λI + Σ_j (c-1) y_j y_jᵗ) x_u = Σ_j c y_j
//
// over the user's observed items, then items solve the transposed system.

use super::linalg::solve_or_pseudo_inverse;
use super::{FactorizationError, MfModel, Result};
use crate::config::MfConfig;
use crate::models::Trip;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

const INIT_SCALE: f64 = 0.01;

/// Binary user x item observations, with ids mapped to dense indices
/// in first-seen corpus order.
#[derive(Debug, Clone, Default)]
pub struct InteractionMatrix {
    pub user_index: HashMap<String, usize>,
    pub item_index: HashMap<String, usize>,
    pub users: Vec<String>,
    pub items: Vec<String>,
    pub user_items: Vec<Vec<usize>>,
    pub item_users: Vec<Vec<usize>>,
}

impl InteractionMatrix {
    pub fn build(trips: &[Trip]) -> Self {
        let mut matrix = InteractionMatrix::default();
        let mut observed: HashSet<(usize, usize)> = HashSet::new();

        for trip in trips {
            let item = match matrix.item_index.get(&trip.id) {
                Some(&j) => j,
                None => {
                    let j = matrix.items.len();
                    matrix.item_index.insert(trip.id.clone(), j);
                    matrix.items.push(trip.id.clone());
                    matrix.item_users.push(Vec::new());
                    j
                }
            };

            let participants = trip
                .likes
                .iter()
                .chain(trip.saved_by.iter())
                .chain(std::iter::once(&trip.user_id))
                .filter(|u| !u.is_empty());

            for user_id in participants {
                let user = match matrix.user_index.get(user_id) {
                    Some(&u) => u,
                    None => {
                        let u = matrix.users.len();
                        matrix.user_index.insert(user_id.clone(), u);
                        matrix.users.push(user_id.clone());
                        matrix.user_items.push(Vec::new());
                        u
                    }
                };

                if observed.insert((user, item)) {
                    matrix.user_items[user].push(item);
                    matrix.item_users[item].push(user);
                }
            }
        }

        matrix
    }

    /// `(distinct users, distinct items)`
    pub fn shape(&self) -> (usize, usize) {
        (self.users.len(), self.items.len())
    }
}

pub struct ImplicitAls {
    config: MfConfig,
}

impl ImplicitAls {
    pub fn new(config: MfConfig) -> Self {
        Self { config }
    }

    /// Factorize the interaction matrix. Bounded by the configured iteration count.
    pub fn fit(&self, matrix: InteractionMatrix) -> Result<MfModel> {
        let (num_users, num_items) = matrix.shape();
        if num_users == 0 || num_items == 0 {
            return Err(FactorizationError::EmptyInteractions);
        }

        let factors = self.config.factors;
        let confidence = 1.0 + self.config.alpha;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut user_factors =
            Array2::from_shape_fn((num_users, factors), |_| rng.gen_range(-INIT_SCALE..INIT_SCALE));
        let mut item_factors =
            Array2::from_shape_fn((num_items, factors), |_| rng.gen_range(-INIT_SCALE..INIT_SCALE));

        for iteration in 0..self.config.iter {
            update_factors(
                &mut user_factors,
                &item_factors,
                &matrix.user_items,
                self.config.reg,
                confidence,
            );
            update_factors(
                &mut item_factors,
                &user_factors,
                &matrix.item_users,
                self.config.reg,
                confidence,
            );
            debug!(
                iteration = iteration + 1,
                total = self.config.iter,
                "ALS iteration done"
            );
        }

        Ok(MfModel {
            built_at: Instant::now(),
            user_index: matrix.user_index,
            items: matrix.items,
            user_factors,
            item_factors,
        })
    }
}

/// One half-step: re-solve every row of `target` holding `fixed` constant
fn update_factors(
    target: &mut Array2<f64>,
    fixed: &Array2<f64>,
    observed: &[Vec<usize>],
    reg: f64,
    confidence: f64,
) {
    let factors = fixed.ncols();
    let gram = fixed.t().dot(fixed) + Array2::<f64>::eye(factors) * reg;

    for (row, columns) in observed.iter().enumerate() {
        if columns.is_empty() {
            continue;
        }

        let mut lhs = gram.clone();
        let mut rhs = Array1::<f64>::zeros(factors);

        for &j in columns {
            let y = fixed.row(j);
            for p in 0..factors {
                let weighted = (confidence - 1.0) * y[p];
                if weighted == 0.0 {
                    continue;
                }
                for q in 0..factors {
                    lhs[[p, q]] += weighted * y[q];
                }
            }
            rhs.scaled_add(confidence, &y);
        }

        let solution = solve_or_pseudo_inverse(&lhs, &rhs);
        target.row_mut(row).assign(&solution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> MfConfig {
        MfConfig {
            factors: 4,
            iter: 5,
            ..Default::default()
        }
    }

    fn corpus() -> Vec<Trip> {
        vec![
            Trip::new("t1", "o1").with_likes(&["a", "b"]),
            Trip::new("t2", "o1").with_likes(&["a", "b"]),
            Trip::new("t3", "o2").with_likes(&["c"]),
            Trip::new("t4", "o2").with_saved_by(&["b", "a"]),
        ]
    }

    #[test]
    fn test_matrix_counts_owners_and_dedups() {
        let trips = vec![
            Trip::new("t1", "owner").with_likes(&["u"]).with_saved_by(&["u"]),
            Trip::new("t2", ""),
        ];

        let matrix = InteractionMatrix::build(&trips);

        assert_eq!(matrix.shape(), (2, 2));
        assert_eq!(matrix.user_items[matrix.user_index["u"]], vec![0]);
        assert!(matrix.item_users[1].is_empty());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let als = ImplicitAls::new(small_config());

        let first = als.fit(InteractionMatrix::build(&corpus())).unwrap();
        let second = als.fit(InteractionMatrix::build(&corpus())).unwrap();

        assert_eq!(first.user_factors, second.user_factors);
        assert_eq!(first.item_factors, second.item_factors);
    }

    #[test]
    fn test_observed_items_score_higher_than_unobserved() {
        let als = ImplicitAls::new(small_config());

        let model = als.fit(InteractionMatrix::build(&corpus())).unwrap();
        let scores: HashMap<&str, f64> = model.score_items("a").unwrap().into_iter().collect();

        assert!(scores["t1"] > scores["t3"]);
        assert!(model.score_items("nobody").is_none());
    }

    #[test]
    fn test_empty_corpus() {
        let als = ImplicitAls::new(small_config());
        let result = als.fit(InteractionMatrix::build(&[]));
        assert!(matches!(result, Err(FactorizationError::EmptyInteractions)));
    }
}
