use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trip_ranking_service::{
    EngineConfig, JsonSnapshotStore, OnnxModelStore, RecommendationEngine, ServiceConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let service = ServiceConfig::from_env().context("Failed to load service config")?;
    let config = EngineConfig::from_env().context("Failed to load engine config")?;

    info!(
        service = %service.service_name,
        snapshot = %service.snapshot_path,
        model_dir = %config.reranker.model_dir,
        top_k = config.top_k,
        "Starting {}",
        service.service_name
    );

    let user_id = service
        .user_id
        .clone()
        .context("USER_ID must be set to the user to recommend for")?;

    let model_store = Arc::new(OnnxModelStore::open(&config.reranker.model_dir));
    let store = JsonSnapshotStore::new(&service.snapshot_path);
    let engine = RecommendationEngine::new(config, model_store)?;

    let response = engine
        .recommend_for_user(&store, &user_id)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Recommendation failed");
            e
        })?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
