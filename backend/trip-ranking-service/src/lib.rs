pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod utils;

pub use config::{EngineConfig, ServiceConfig};
pub use error::{RecommendError, Result};
pub use models::{RecommendationResponse, Trip, UserProfile, UserRecord};
pub use pipeline::RecommendationEngine;
pub use services::ranking::{ModelStore, NoModelStore, OnnxModelStore};
pub use services::{DiversityLayer, MfModelCache, RankFusion, RecallLayer, SupervisedReranker};
pub use store::{DocumentStore, InMemoryDocumentStore, JsonSnapshotStore};
