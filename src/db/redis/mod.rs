pub mod cache;
pub mod parameters;

pub use cache::create_redis_client;
pub use cache::CacheKey;
pub use cache::RedisRecommendationCache;
pub use parameters::RedisParameterStore;
