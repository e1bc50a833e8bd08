use super::{FactorizationError, ImplicitAls, InteractionMatrix, MfModel, Result};
use crate::config::MfConfig;
use crate::models::Trip;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Process-wide holder of the current factorization model.
///
/// Readers always see either the previous valid model or a fully built new
/// one. Concurrent rebuild triggers coalesce on `rebuild_lock`, and the model
/// is swapped in whole after training finishes.
pub struct MfModelCache {
    config: MfConfig,
    ttl: Duration,
    current: RwLock<Option<Arc<MfModel>>>,
    rebuild_lock: Mutex<()>,
    rebuilds: AtomicU64,
}

impl MfModelCache {
    pub fn new(config: MfConfig) -> Self {
        let ttl = config.ttl();
        Self {
            config,
            ttl,
            current: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Override the TTL derived from `rebuild_min`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return the cached model if still valid for this corpus, otherwise
    /// train a new one and replace the cache.
    pub async fn get_or_rebuild(&self, trips: &[Trip]) -> Result<Arc<MfModel>> {
        let matrix = InteractionMatrix::build(trips);
        let shape = matrix.shape();

        if let Some(model) = self.valid_model(shape).await {
            debug!(users = shape.0, items = shape.1, "Reusing cached MF model");
            return Ok(model);
        }

        let _guard = self.rebuild_lock.lock().await;

        // another request may have finished a rebuild while we waited
        if let Some(model) = self.valid_model(shape).await {
            debug!(users = shape.0, items = shape.1, "MF model rebuilt by concurrent request");
            return Ok(model);
        }

        info!(
            users = shape.0,
            items = shape.1,
            factors = self.config.factors,
            "Rebuilding MF model"
        );

        let started = Instant::now();
        let als = ImplicitAls::new(self.config.clone());
        let model = tokio::task::spawn_blocking(move || als.fit(matrix))
            .await
            .map_err(|e| FactorizationError::Task(e.to_string()))??;
        let model = Arc::new(model);

        *self.current.write().await = Some(Arc::clone(&model));
        self.rebuilds.fetch_add(1, Ordering::SeqCst);

        info!(
            users = shape.0,
            items = shape.1,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "MF model rebuilt"
        );

        Ok(model)
    }

    async fn valid_model(&self, shape: (usize, usize)) -> Option<Arc<MfModel>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|model| !model.is_stale(self.ttl, shape))
            .cloned()
    }

    /// Number of completed rebuilds since construction
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Drop the cached model (for testing)
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}
