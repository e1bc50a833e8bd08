//! Trip Ranker Model Inference Module
//!
//! Loads ONNX-exported gradient-boosted models with tract-onnx.
//! Absence of a model is a normal state: the reranker then yields nothing.

use super::features::FEATURE_VECTOR_SIZE;
use super::{RankingError, Result};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Preferred: trained with a ranking objective, outputs raw scores
pub const RANKER_MODEL_FILE: &str = "trip_ranker.onnx";
/// Fallback: binary classifier, positive-class probability is the score
pub const CLASSIFIER_MODEL_FILE: &str = "trip_classifier.onnx";

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// One raw score per row
    Raw,
    /// Class probabilities per row; the last column is the positive class
    Probability,
}

/// Scalar scoring function over a feature matrix
pub trait ScoringModel: Send + Sync {
    /// * `features` - 2D array (batch_size × FEATURE_VECTOR_SIZE)
    /// * returns one base score per row
    fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>>;
}

#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn ScoringModel>,
    pub kind: ModelKind,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel").field("kind", &self.kind).finish()
    }
}

/// Source of the pre-trained scorer. `Ok(None)` means no model is deployed.
#[cfg_attr(test, mockall::automock)]
pub trait ModelStore: Send + Sync {
    fn load(&self) -> Result<Option<LoadedModel>>;
}

/// Model store that never has a model
pub struct NoModelStore;

impl ModelStore for NoModelStore {
    fn load(&self) -> Result<Option<LoadedModel>> {
        Ok(None)
    }
}

/// Model store over a directory of ONNX exports, loaded once at startup
pub struct OnnxModelStore {
    dir: PathBuf,
    loaded: Option<LoadedModel>,
}

impl OnnxModelStore {
    /// Loads the ranker if present, else the classifier. A model that fails
    /// to load is logged and treated as absent.
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let candidates = [
            (RANKER_MODEL_FILE, ModelKind::Raw),
            (CLASSIFIER_MODEL_FILE, ModelKind::Probability),
        ];

        let mut loaded = None;
        for (file, kind) in candidates {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            match OnnxScoringModel::load(&path, kind) {
                Ok(model) => {
                    info!(path = %path.display(), kind = ?kind, "Loaded ONNX ranking model");
                    loaded = Some(LoadedModel {
                        model: Arc::new(model),
                        kind,
                    });
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load ONNX model");
                }
            }
        }

        if loaded.is_none() {
            debug!(dir = %dir.display(), "No ranking model available");
        }

        Self { dir, loaded }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ModelStore for OnnxModelStore {
    fn load(&self) -> Result<Option<LoadedModel>> {
        Ok(self.loaded.clone())
    }
}

/// tract-onnx runnable plan
pub struct OnnxScoringModel {
    plan: Arc<OnnxPlan>,
    kind: ModelKind,
}

impl OnnxScoringModel {
    pub fn load(path: &Path, kind: ModelKind) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| RankingError::ModelLoadError(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            plan: Arc::new(plan),
            kind,
        })
    }
}

impl ScoringModel for OnnxScoringModel {
    fn predict(&self, features: &Array2<f32>) -> Result<Array1<f32>> {
        let batch_size = features.nrows();

        if features.ncols() != FEATURE_VECTOR_SIZE {
            return Err(RankingError::InvalidInput(format!(
                "Expected {} features, got {}",
                FEATURE_VECTOR_SIZE,
                features.ncols()
            )));
        }

        // Convert ndarray to tract tensor
        let input_tensor = tract_ndarray::Array2::from_shape_fn(
            (batch_size, FEATURE_VECTOR_SIZE),
            |(i, j)| features[[i, j]],
        );

        let outputs = self
            .plan
            .run(tvec![Tensor::from(input_tensor).into()])
            .map_err(|e| RankingError::InferenceError(format!("ONNX inference failed: {}", e)))?;

        for output in outputs.iter() {
            let Ok(view) = output.to_array_view::<f32>() else {
                continue;
            };
            if let Some(scores) = select_scores(self.kind, view, batch_size) {
                return Ok(scores);
            }
        }

        Err(RankingError::InferenceError(format!(
            "no f32 output matching batch size {} for {:?} model",
            batch_size, self.kind
        )))
    }
}

/// Pick the per-row score out of one model output: the whole output for
/// `Raw`, the last (positive class) column for `Probability`. `None` when the
/// output does not fit the batch.
fn select_scores(
    kind: ModelKind,
    view: tract_ndarray::ArrayViewD<'_, f32>,
    batch_size: usize,
) -> Option<Array1<f32>> {
    match kind {
        ModelKind::Probability => {
            let probabilities = view.into_dimensionality::<tract_ndarray::Ix2>().ok()?;
            if probabilities.nrows() != batch_size || probabilities.ncols() == 0 {
                return None;
            }
            let last = probabilities.ncols() - 1;
            Some(Array1::from_iter(probabilities.column(last).iter().copied()))
        }
        ModelKind::Raw if view.len() == batch_size => {
            Some(Array1::from_iter(view.iter().copied()))
        }
        ModelKind::Raw => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_output_is_taken_whole() {
        let output = tract_ndarray::arr2(&[[0.5f32], [1.5], [-2.0]]).into_dyn();

        let scores = select_scores(ModelKind::Raw, output.view(), 3).unwrap();

        assert_eq!(scores.to_vec(), vec![0.5, 1.5, -2.0]);
        assert!(select_scores(ModelKind::Raw, output.view(), 2).is_none());
    }

    #[test]
    fn test_probability_output_uses_positive_class_column() {
        let output = tract_ndarray::arr2(&[[0.9f32, 0.1], [0.2, 0.8]]).into_dyn();

        let scores = select_scores(ModelKind::Probability, output.view(), 2).unwrap();

        assert_eq!(scores.to_vec(), vec![0.1, 0.8]);
        assert!(select_scores(ModelKind::Probability, output.view(), 3).is_none());
    }

    #[test]
    fn test_probability_output_without_columns_is_skipped() {
        let output = tract_ndarray::Array2::<f32>::zeros((2, 0)).into_dyn();
        let flat = tract_ndarray::arr1(&[0.3f32, 0.7]).into_dyn();

        assert!(select_scores(ModelKind::Probability, output.view(), 2).is_none());
        assert!(select_scores(ModelKind::Probability, flat.view(), 2).is_none());
    }

    #[test]
    fn test_no_model_store() {
        assert!(NoModelStore.load().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_has_no_model() {
        let dir = tempfile::tempdir().unwrap();

        let store = OnnxModelStore::open(dir.path());

        assert!(store.load().unwrap().is_none());
        assert_eq!(store.dir(), dir.path());
    }

    #[test]
    fn test_corrupt_model_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RANKER_MODEL_FILE), b"not an onnx file").unwrap();

        let store = OnnxModelStore::open(dir.path());

        assert!(store.load().unwrap().is_none());
    }
}
