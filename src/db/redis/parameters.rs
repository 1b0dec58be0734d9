use redis::AsyncCommands;
use redis::Client;

use crate::db::parameters::ParameterStore;
use crate::error::{AppError, AppResult};

/// Reads runtime parameters stored as plain string values in Redis
#[derive(Clone)]
pub struct RedisParameterStore {
    redis_client: Client,
    retrain_freq_key: String,
}

impl RedisParameterStore {
    pub fn new(redis_client: Client, retrain_freq_key: String) -> Self {
        Self {
            redis_client,
            retrain_freq_key,
        }
    }
}

fn parse_days(key: &str, raw: Option<String>) -> AppResult<u32> {
    let raw = raw.ok_or_else(|| {
        AppError::BackendUnavailable(format!("Parameter {} is not set", key))
    })?;
    match raw.trim().parse::<u32>() {
        Ok(days) if days > 0 => Ok(days),
        _ => Err(AppError::BackendUnavailable(format!(
            "Parameter {} has invalid value {:?}",
            key, raw
        ))),
    }
}

#[async_trait::async_trait]
impl ParameterStore for RedisParameterStore {
    async fn retrain_interval_days(&self) -> AppResult<u32> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(&self.retrain_freq_key).await?;
        let days = parse_days(&self.retrain_freq_key, raw)?;
        tracing::debug!(key = %self.retrain_freq_key, days, "Read retrain interval");
        Ok(days)
    }
}
