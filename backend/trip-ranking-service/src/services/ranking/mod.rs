//! Ranking Module
//!
//! Supervised reranking of the recalled candidate pool.
//!
//! # Architecture
//! - **Feature Layer**: 12 engineered (user, trip) features
//! - **Model Layer**: pre-trained scorer behind the `ModelStore` seam,
//!   ONNX inference with tract-onnx
//! - **Blend Layer**: base score + α · preference signal
//!
//! # Workflow
//! 1. Union content / item-CF / user-CF outputs, backfill from the corpus
//! 2. Build the feature matrix
//! 3. Run model inference → base scores
//! 4. Add the pool-normalized preference signal, sort, truncate to K

pub mod features;
pub mod model;
pub mod reranker;

pub use features::{FeatureExtractor, FEATURE_NAMES, FEATURE_VECTOR_SIZE};
pub use model::{LoadedModel, ModelKind, ModelStore, NoModelStore, OnnxModelStore, ScoringModel};
pub use reranker::SupervisedReranker;

#[cfg(test)]
pub use model::MockModelStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtractionError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;
