mod als;
mod cache;
mod linalg;

use ndarray::Array2;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use als::{ImplicitAls, InteractionMatrix};
pub use cache::MfModelCache;
pub use linalg::{pseudo_inverse_solve, solve, solve_or_pseudo_inverse};

#[derive(Debug, Error)]
pub enum FactorizationError {
    #[error("Singular system")]
    Singular,

    #[error("Dimension mismatch: {0}")]
    Dimension(String),

    #[error("No interactions to factorize")]
    EmptyInteractions,

    #[error("Rebuild task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, FactorizationError>;

/// Trained factor matrices plus the id mappings they were built with.
/// Immutable once built; the cache swaps whole models.
#[derive(Debug)]
pub struct MfModel {
    built_at: Instant,
    user_index: HashMap<String, usize>,
    items: Vec<String>,
    user_factors: Array2<f64>,
    item_factors: Array2<f64>,
}

impl MfModel {
    /// `(numUsers, numItems)`
    pub fn shape(&self) -> (usize, usize) {
        (self.user_factors.nrows(), self.item_factors.nrows())
    }

    pub fn factors(&self) -> usize {
        self.user_factors.ncols()
    }

    /// Older than `ttl`, or built for a different corpus shape
    pub fn is_stale(&self, ttl: Duration, shape: (usize, usize)) -> bool {
        self.built_at.elapsed() > ttl || self.shape() != shape
    }

    /// `Y[item] · X[user]` for every item, in item-index order.
    /// `None` for users the model has never seen.
    pub fn score_items(&self, user_id: &str) -> Option<Vec<(&str, f64)>> {
        let &row = self.user_index.get(user_id)?;
        let scores = self.item_factors.dot(&self.user_factors.row(row));

        Some(
            self.items
                .iter()
                .map(String::as_str)
                .zip(scores.iter().copied())
                .collect(),
        )
    }
}
