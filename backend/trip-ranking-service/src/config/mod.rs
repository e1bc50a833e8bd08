use crate::error::{RecommendError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration. Loaded once per process and treated as immutable.
/// Environment keys stay snake_case for envy; responses echo it in camelCase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct EngineConfig {
    pub top_k: usize,
    pub content: ContentConfig,
    pub cf: CfConfig,
    pub mf: MfConfig,
    pub fusion: FusionConfig,
    pub reranker: RerankerConfig,
}

/// Content scorer weights, boosts and MMR knobs (`REC_*`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
#[serde(default)]
pub struct ContentConfig {
    pub weight_tag: f64,
    pub weight_budget: f64,
    pub weight_destination: f64,
    pub weight_style: f64,
    pub weight_pop: f64,
    pub weight_recency: f64,
    pub boost_liked: f64,
    pub boost_saved: f64,
    pub recency_half_life_days: f64,
    pub mmr_lambda: f64,
    /// Penalty per already-selected trip sharing a destination
    pub dest_dup_decay: f64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            weight_tag: 3.0,
            weight_budget: 1.5,
            weight_destination: 2.5,
            weight_style: 3.0,
            weight_pop: 0.3,
            weight_recency: 0.2,
            boost_liked: 1.0,
            boost_saved: 0.7,
            recency_half_life_days: 30.0,
            mmr_lambda: 0.7,
            dest_dup_decay: 0.15,
        }
    }
}

/// Collaborative filtering knobs (`REC_CF_*`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
#[serde(default)]
pub struct CfConfig {
    pub follow_bonus: f64,
    pub min_overlap: usize,
    pub max_neighbors: usize,
    pub user_damping: f64,
    pub popularity_weight: f64,
}

impl Default for CfConfig {
    fn default() -> Self {
        Self {
            follow_bonus: 0.2,
            min_overlap: 1,
            max_neighbors: 20,
            user_damping: 0.5,
            popularity_weight: 0.15,
        }
    }
}

/// Implicit ALS hyperparameters (`REC_MF_*`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
#[serde(default)]
pub struct MfConfig {
    pub factors: usize,
    pub reg: f64,
    pub alpha: f64,
    pub iter: usize,
    /// Model TTL in minutes
    pub rebuild_min: u64,
    pub seed: u64,
}

impl Default for MfConfig {
    fn default() -> Self {
        Self {
            factors: 32,
            reg: 0.1,
            alpha: 40.0,
            iter: 10,
            rebuild_min: 10,
            seed: 42,
        }
    }
}

impl MfConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.rebuild_min.saturating_mul(60))
    }
}

/// Hybrid rank fusion weights (`REC_HYBRID_*`). Content always weighs 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
#[serde(default)]
pub struct FusionConfig {
    pub user_cf_weight: f64,
    pub item_cf_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            user_cf_weight: 0.8,
            item_cf_weight: 0.6,
        }
    }
}

/// Supervised reranker blending (`RANKER_*`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
#[serde(default)]
pub struct RerankerConfig {
    pub pref_alpha: f64,
    pub pref_w_tag: f64,
    pub pref_w_style: f64,
    pub pref_w_budget: f64,
    pub pref_w_dest: f64,
    pub min_pool_size: usize,
    pub model_dir: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            pref_alpha: 1.0,
            pref_w_tag: 1.0,
            pref_w_style: 1.0,
            pref_w_budget: 1.0,
            pref_w_dest: 1.0,
            min_pool_size: 50,
            model_dir: "models".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            content: ContentConfig::default(),
            cf: CfConfig::default(),
            mf: MfConfig::default(),
            fusion: FusionConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopKEnv {
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    10
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = EngineConfig {
            top_k: envy::prefixed("REC_").from_env::<TopKEnv>()?.top_k,
            content: envy::prefixed("REC_").from_env::<ContentConfig>()?,
            cf: envy::prefixed("REC_CF_").from_env::<CfConfig>()?,
            mf: envy::prefixed("REC_MF_").from_env::<MfConfig>()?,
            fusion: envy::prefixed("REC_HYBRID_").from_env::<FusionConfig>()?,
            reranker: envy::prefixed("RANKER_").from_env::<RerankerConfig>()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RecommendError::Configuration(
                "REC_TOP_K must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.content.mmr_lambda) {
            return Err(RecommendError::Configuration(format!(
                "REC_MMR_LAMBDA must be in [0, 1], got {}",
                self.content.mmr_lambda
            )));
        }

        if self.content.recency_half_life_days < 0.0 {
            return Err(RecommendError::Configuration(
                "REC_RECENCY_HALF_LIFE_DAYS must be non-negative".to_string(),
            ));
        }

        if self.mf.factors == 0 {
            return Err(RecommendError::Configuration(
                "REC_MF_FACTORS must be greater than 0".to_string(),
            ));
        }

        if self.mf.reg < 0.0 || self.mf.alpha < 0.0 {
            return Err(RecommendError::Configuration(
                "REC_MF_REG and REC_MF_ALPHA must be non-negative".to_string(),
            ));
        }

        if self.cf.user_damping < 0.0 || self.cf.popularity_weight < 0.0 {
            return Err(RecommendError::Configuration(
                "REC_CF_USER_DAMPING and REC_CF_POPULARITY_WEIGHT must be non-negative"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings for the standalone binary only
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_service_name() -> String {
    "trip-ranking-service".to_string()
}

fn default_snapshot_path() -> String {
    "data/snapshot.json".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env::<ServiceConfig>()?)
    }
}
