pub mod cache;
pub mod parameters;
pub mod redis;

pub use cache::{InMemoryRecommendationCache, RecommendationCache};
pub use parameters::{ParameterStore, StaticParameterStore};
pub use self::redis::{create_redis_client, RedisParameterStore, RedisRecommendationCache};
