// ============================================
// Recommendation Pipeline (推薦流程)
// ============================================
//
// 1. Recall: content / item-CF / user-CF / MF run concurrently, each isolated
// 2. Pool: union of content + item-CF + user-CF, backfilled from the corpus
// 3. Rerank: supervised model + preference blend over the pool
// 4. Fusion: weighted positional merge of content + user-CF + item-CF
//
// Every list is returned side by side with the active weights.

use crate::config::EngineConfig;
use crate::error::{RecommendError, Result};
use crate::models::{
    RecallSource, RecallStats, RecommendationResponse, ScoredTrip, Trip, UserProfile,
};
use crate::services::fusion::RankFusion;
use crate::services::matrix_factorization::MfModelCache;
use crate::services::profile_builder::build_profile;
use crate::services::ranking::{ModelStore, SupervisedReranker};
use crate::services::recall::{
    ContentRecallStrategy, ItemCFRecallStrategy, MatrixFactorizationRecallStrategy,
    RecallContext, RecallError, RecallLayer, RecallStrategy, StrategyOutcome,
    UserCFRecallStrategy,
};
use crate::store::DocumentStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub struct RecommendationEngine {
    config: Arc<EngineConfig>,
    recall: RecallLayer,
    mf_cache: Arc<MfModelCache>,
    reranker: Arc<SupervisedReranker>,
    fusion: RankFusion,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig, model_store: Arc<dyn ModelStore>) -> Result<Self> {
        let cache = Arc::new(MfModelCache::new(config.mf.clone()));
        Self::with_mf_cache(config, model_store, cache)
    }

    /// Build an engine over an existing factorization cache, so several
    /// engines in one process share a single model.
    pub fn with_mf_cache(
        config: EngineConfig,
        model_store: Arc<dyn ModelStore>,
        mf_cache: Arc<MfModelCache>,
    ) -> Result<Self> {
        config.validate()?;

        let strategies: Vec<Arc<dyn RecallStrategy>> = vec![
            Arc::new(ContentRecallStrategy::new(config.content.clone())),
            Arc::new(ItemCFRecallStrategy::new(config.cf.clone())),
            Arc::new(UserCFRecallStrategy::new(config.cf.clone())),
            Arc::new(MatrixFactorizationRecallStrategy::new(Arc::clone(&mf_cache))),
        ];

        Ok(Self {
            recall: RecallLayer::new(strategies),
            reranker: Arc::new(SupervisedReranker::new(
                config.reranker.clone(),
                model_store,
            )),
            fusion: RankFusion::new(&config.fusion),
            mf_cache,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mf_cache(&self) -> &Arc<MfModelCache> {
        &self.mf_cache
    }

    /// Rank the corpus for one profile. Only a missing user id is an error;
    /// every strategy failure degrades to an empty list for that strategy.
    pub async fn recommend(
        &self,
        profile: &UserProfile,
        trips: Arc<Vec<Trip>>,
    ) -> Result<RecommendationResponse> {
        if profile.user_id.trim().is_empty() {
            return Err(RecommendError::InvalidInput(
                "userId is required".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        let span = info_span!(
            "recommend",
            request_id = %request_id,
            user_id = %profile.user_id
        );

        self.run(profile, trips, request_id).instrument(span).await
    }

    async fn run(
        &self,
        profile: &UserProfile,
        trips: Arc<Vec<Trip>>,
        request_id: Uuid,
    ) -> Result<RecommendationResponse> {
        let top_k = self.config.top_k;
        let ctx = Arc::new(RecallContext::new(profile, trips, top_k, Utc::now()));

        info!(
            corpus = ctx.trips.len(),
            interacted = ctx.interacted.len(),
            top_k,
            "Recommendation request started"
        );

        let mut recalled = self.recall.recall_all(Arc::clone(&ctx)).await;
        let mut take = |source: RecallSource| recalled.remove(&source).unwrap_or_default();
        let content = take(RecallSource::Content);
        let item_cf = take(RecallSource::ItemCF);
        let user_cf = take(RecallSource::UserCF);
        let matrix_factorization = take(RecallSource::MatrixFactorization);

        let pool = self.reranker.build_pool(
            &ctx,
            &[content.as_slice(), item_cf.as_slice(), user_cf.as_slice()],
        );
        let pool_size = pool.len();

        let reranker = Arc::clone(&self.reranker);
        let rerank_ctx = Arc::clone(&ctx);
        let joined = tokio::task::spawn_blocking(move || {
            reranker
                .rerank(&rerank_ctx, &pool)
                .map_err(RecallError::from)
        })
        .await;
        let reranked = StrategyOutcome::from_join(joined).into_ranked(RecallSource::Reranker);

        let hybrid = self.fusion.fuse(&content, &user_cf, &item_cf, top_k);

        let stats = RecallStats {
            content_count: content.len(),
            item_cf_count: item_cf.len(),
            user_cf_count: user_cf.len(),
            matrix_factorization_count: matrix_factorization.len(),
            candidate_pool_size: pool_size,
            reranked_count: reranked.len(),
            final_count: hybrid.len(),
        };

        info!(
            content = stats.content_count,
            item_cf = stats.item_cf_count,
            user_cf = stats.user_cf_count,
            matrix_factorization = stats.matrix_factorization_count,
            pool = stats.candidate_pool_size,
            reranked = stats.reranked_count,
            final_count = stats.final_count,
            "Recommendation request completed"
        );

        Ok(RecommendationResponse {
            user_id: ctx.user_id().to_string(),
            request_id: request_id.to_string(),
            top_k: into_trips(hybrid),
            content_based: into_trips(content),
            item_collaborative: into_trips(item_cf),
            user_collaborative: into_trips(user_cf),
            matrix_factorization: into_trips(matrix_factorization),
            reranked: into_trips(reranked),
            stats,
            weights: self.config.as_ref().clone(),
        })
    }

    /// Validate the id, fetch the user and the corpus once, build the
    /// profile and rank.
    pub async fn recommend_for_user(
        &self,
        store: &dyn DocumentStore,
        user_id: &str,
    ) -> Result<RecommendationResponse> {
        if user_id.trim().is_empty() {
            return Err(RecommendError::InvalidInput(
                "userId is required".to_string(),
            ));
        }

        let user = store
            .get_user(user_id)
            .await?
            .ok_or_else(|| RecommendError::NotFound(format!("user {}", user_id)))?;
        let trips = store.list_trips().await?;

        let profile = build_profile(&user, &trips);
        self.recommend(&profile, Arc::new(trips)).await
    }
}

fn into_trips(scored: Vec<ScoredTrip>) -> Vec<Trip> {
    scored.into_iter().map(|s| s.trip).collect()
}
