use crate::error::AppResult;

/// Source of runtime parameters that may change between deployments
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    /// Days between batch retraining runs
    async fn retrain_interval_days(&self) -> AppResult<u32>;
}

/// Fixed interval, set through `RETRAIN_FREQ_DAYS`
pub struct StaticParameterStore {
    days: u32,
}

impl StaticParameterStore {
    pub fn new(days: u32) -> Self {
        Self { days }
    }
}

#[async_trait::async_trait]
impl ParameterStore for StaticParameterStore {
    async fn retrain_interval_days(&self) -> AppResult<u32> {
        Ok(self.days)
    }
}
