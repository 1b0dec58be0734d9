use serde::Deserialize;
use std::path::PathBuf;

/// Which endpoints this process serves
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    /// Query endpoint only; inference is reached over HTTP
    Query,
    /// `/ping` and `/invocations` only
    Inference,
    /// Both, with the query router calling the in-process recommender
    Combined,
}

/// Backing store for the recommendation cache
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_role")]
    pub role: ServiceRole,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Redis connection URL, used for the cache and the parameter store
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackend,

    /// Base URL of a remote inference host. Required for the `query` role.
    #[serde(default)]
    pub inference_url: Option<String>,

    /// Upper bound on a single inference round-trip
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    /// Directory holding preferences.json, profiles.json and segments.json
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Parameter-store key holding the retrain interval in days
    #[serde(default = "default_retrain_freq_param")]
    pub retrain_freq_param: String,

    /// Static retrain interval; bypasses the parameter store when set
    #[serde(default)]
    pub retrain_freq_days: Option<u32>,

    /// Number of items produced per new-user computation
    #[serde(default = "default_recommendation_count")]
    pub recommendation_count: usize,

    #[serde(default = "default_index_trees")]
    pub index_trees: usize,

    #[serde(default = "default_index_leaf_size")]
    pub index_leaf_size: usize,

    #[serde(default = "default_index_seed")]
    pub index_seed: u64,
}

fn default_role() -> ServiceRole {
    ServiceRole::Combined
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Redis
}

fn default_inference_timeout_ms() -> u64 {
    2000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("/opt/ml/model")
}

fn default_retrain_freq_param() -> String {
    "recommender.retrain_freq".to_string()
}

fn default_recommendation_count() -> usize {
    100
}

fn default_index_trees() -> usize {
    10
}

fn default_index_leaf_size() -> usize {
    16
}

fn default_index_seed() -> u64 {
    42
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.role == ServiceRole::Query && self.inference_url.is_none() {
            anyhow::bail!("INFERENCE_URL is required when ROLE=query");
        }
        if self.index_trees == 0 || self.index_leaf_size == 0 {
            anyhow::bail!("INDEX_TREES and INDEX_LEAF_SIZE must be positive");
        }
        // Records would be written already expired
        if self.retrain_freq_days == Some(0) {
            anyhow::bail!("RETRAIN_FREQ_DAYS must be positive");
        }
        Ok(())
    }

    pub fn index_params(&self) -> crate::services::ann::IndexParams {
        crate::services::ann::IndexParams {
            n_trees: self.index_trees,
            leaf_size: self.index_leaf_size,
            seed: self.index_seed,
        }
    }
}
