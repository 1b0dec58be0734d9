use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;

use crate::db::cache::RecommendationCache;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::RecommendationRecord;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One stored record, addressed by `(user_id, model_id)`
    Record { user_id: String, model_id: i64 },
    /// Sorted set of a user's model ids, scored by model id
    Versions(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Record { user_id, model_id } => write!(f, "rec:{}:{}", user_id, model_id),
            CacheKey::Versions(user_id) => write!(f, "rec_versions:{}", user_id),
        }
    }
}

/// Versions read per round-trip while looking for the newest live record
const VERSION_PAGE_SIZE: isize = 8;

/// Lowest model id worth keeping in the version set when `record` is written
///
/// A version created more than one retention span before `record` has
/// expired by the time `record` exists, given the same retrain interval.
fn stale_cutoff(record: &RecommendationRecord) -> i64 {
    let span = record.expiry_time - record.model_id;
    record.model_id - span
}

/// Creates a Redis client for caching
///
/// Uses multiplexed async connections, so one client is shared across requests.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Recommendation store on Redis
///
/// Each record lives under its own key and carries an `EXPIREAT` equal to its
/// `expiry_time`, so Redis reclaims stale records on its own. A per-user sorted
/// set of model ids lets `get_latest` find the newest version without scanning.
#[derive(Clone)]
pub struct RedisRecommendationCache {
    redis_client: Client,
}

impl RedisRecommendationCache {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    fn decode(json: &str) -> AppResult<RecommendationRecord> {
        serde_json::from_str(json)
            .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))
    }
}

#[async_trait::async_trait]
impl RecommendationCache for RedisRecommendationCache {
    async fn put(&self, record: &RecommendationRecord) -> AppResult<()> {
        let record_key = CacheKey::Record {
            user_id: record.user_id.clone(),
            model_id: record.model_id,
        }
        .to_string();
        let versions_key = CacheKey::Versions(record.user_id.clone()).to_string();

        let json = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // Record and version entry land together or not at all. The version
        // set's expiry only ever moves forward (NX for a fresh key, GT after).
        let _: () = redis::pipe()
            .atomic()
            .set(&record_key, json)
            .ignore()
            .cmd("EXPIREAT")
            .arg(&record_key)
            .arg(record.expiry_time)
            .ignore()
            .zadd(&versions_key, record.model_id, record.model_id)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&versions_key)
            .arg("-inf")
            .arg(format!("({}", stale_cutoff(record)))
            .ignore()
            .cmd("EXPIREAT")
            .arg(&versions_key)
            .arg(record.expiry_time)
            .arg("NX")
            .ignore()
            .cmd("EXPIREAT")
            .arg(&versions_key)
            .arg(record.expiry_time)
            .arg("GT")
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, user_id = %record.user_id, "Redis put failed");
                e
            })?;

        tracing::debug!(
            user_id = %record.user_id,
            model_id = record.model_id,
            expiry_time = record.expiry_time,
            items = record.recommendation_id.len(),
            "Cached recommendation record"
        );

        Ok(())
    }

    async fn get_latest(&self, user_id: &str) -> AppResult<Option<RecommendationRecord>> {
        let versions_key = CacheKey::Versions(user_id.to_string()).to_string();
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let mut start = 0isize;
        loop {
            let stop = start + VERSION_PAGE_SIZE - 1;
            let model_ids: Vec<i64> = conn.zrevrange(&versions_key, start, stop).await?;
            if model_ids.is_empty() {
                break;
            }

            for model_id in model_ids {
                let record_key = CacheKey::Record {
                    user_id: user_id.to_string(),
                    model_id,
                };
                let cached: Option<String> = conn.get(record_key.to_string()).await?;
                match cached {
                    Some(json) => return Self::decode(&json).map(Some),
                    None => {
                        // Reclaimed by Redis; an older version may still be present
                        tracing::debug!(user_id = %user_id, model_id, "Skipping reclaimed version");
                    }
                }
            }
            start += VERSION_PAGE_SIZE;
        }

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemSequence;

    #[test]
    fn test_cache_key_display_record() {
        let key = CacheKey::Record {
            user_id: "u1".to_string(),
            model_id: 1_700_000_000,
        };
        assert_eq!(format!("{}", key), "rec:u1:1700000000");
    }

    #[test]
    fn test_cache_key_display_versions() {
        let key = CacheKey::Versions("u1".to_string());
        assert_eq!(format!("{}", key), "rec_versions:u1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = RedisRecommendationCache::decode("not json").unwrap_err();
        assert!(err.to_string().contains("Cache deserialization error"));
    }

    #[test]
    fn test_stale_cutoff_is_one_span_back() {
        let record = RecommendationRecord {
            user_id: "u1".to_string(),
            model_id: 1_000_000,
            recommendation_id: ItemSequence::decode("a"),
            expiry_time: 1_000_000 + 14 * 86_400,
        };
        assert_eq!(stale_cutoff(&record), 1_000_000 - 14 * 86_400);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    async fn cleanup(client: &Client, user_id: &str, model_ids: &[i64]) {
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        for model_id in model_ids {
            let key = CacheKey::Record {
                user_id: user_id.to_string(),
                model_id: *model_id,
            };
            let _: () = conn.del(key.to_string()).await.unwrap();
        }
        let _: () = conn
            .del(CacheKey::Versions(user_id.to_string()).to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_cache_miss() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = RedisRecommendationCache::new(client);

        let retrieved = cache.get_latest("nonexistent_user_12345").await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_put_then_get_latest() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = RedisRecommendationCache::new(client.clone());
        let now = chrono::Utc::now().timestamp();
        let user_id = "redis_test_user_latest";

        let older = RecommendationRecord {
            user_id: user_id.to_string(),
            model_id: now - 10,
            recommendation_id: ItemSequence::decode("a,b,c"),
            expiry_time: now + 600,
        };
        let newer = RecommendationRecord {
            user_id: user_id.to_string(),
            model_id: now,
            recommendation_id: ItemSequence::decode("c,b,a"),
            expiry_time: now + 600,
        };

        cache.put(&newer).await.unwrap();
        cache.put(&older).await.unwrap();

        let latest = cache.get_latest(user_id).await.unwrap();
        assert_eq!(latest, Some(newer));

        cleanup(&client, user_id, &[now - 10, now]).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_reclaimed_version_is_skipped() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = RedisRecommendationCache::new(client.clone());
        let now = chrono::Utc::now().timestamp();
        let user_id = "redis_test_user_reclaimed";

        let survivor = RecommendationRecord {
            user_id: user_id.to_string(),
            model_id: now - 10,
            recommendation_id: ItemSequence::decode("x,y"),
            expiry_time: now + 600,
        };
        cache.put(&survivor).await.unwrap();
        cache
            .put(&RecommendationRecord {
                user_id: user_id.to_string(),
                model_id: now,
                recommendation_id: ItemSequence::decode("gone"),
                expiry_time: now + 600,
            })
            .await
            .unwrap();

        // Simulate store-level reclamation of the newest record
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let reclaimed = CacheKey::Record {
            user_id: user_id.to_string(),
            model_id: now,
        };
        let _: () = conn.del(reclaimed.to_string()).await.unwrap();

        let latest = cache.get_latest(user_id).await.unwrap();
        assert_eq!(latest, Some(survivor));

        cleanup(&client, user_id, &[now - 10, now]).await;
    }

    #[tokio::test]
    #[ignore = "requires Redis >= 7 at REDIS_URL"]
    async fn test_version_set_is_trimmed_and_never_shortened() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = RedisRecommendationCache::new(client.clone());
        let now = chrono::Utc::now().timestamp();
        let user_id = "redis_test_user_versions";
        let span = 600;

        let record = |model_id: i64, expiry_time: i64| RecommendationRecord {
            user_id: user_id.to_string(),
            model_id,
            recommendation_id: ItemSequence::decode("a,b"),
            expiry_time,
        };

        // Ancient version, then a current one that trims it
        cache.put(&record(now - 3 * span, now + 60)).await.unwrap();
        cache.put(&record(now + 1, now + 1 + span)).await.unwrap();
        // Older record arriving late with a shorter expiry
        cache.put(&record(now, now + 30)).await.unwrap();

        let versions_key = CacheKey::Versions(user_id.to_string()).to_string();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let members: Vec<i64> = conn.zrange(&versions_key, 0, -1).await.unwrap();
        assert_eq!(members, vec![now, now + 1]);

        let expire_at: i64 = redis::cmd("EXPIRETIME")
            .arg(&versions_key)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(expire_at, now + 1 + span);

        let latest = cache.get_latest(user_id).await.unwrap().unwrap();
        assert_eq!(latest.model_id, now + 1);

        cleanup(&client, user_id, &[now - 3 * span, now, now + 1]).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_get_latest_pages_past_reclaimed_versions() {
        let client = create_redis_client(&redis_url()).unwrap();
        let cache = RedisRecommendationCache::new(client.clone());
        let now = chrono::Utc::now().timestamp();
        let user_id = "redis_test_user_paged";
        let model_ids: Vec<i64> = (0..20).map(|i| now - 20 + i).collect();

        for &model_id in &model_ids {
            cache
                .put(&RecommendationRecord {
                    user_id: user_id.to_string(),
                    model_id,
                    recommendation_id: ItemSequence::decode("a"),
                    expiry_time: now + 600,
                })
                .await
                .unwrap();
        }

        // Reclaim every version but the oldest, spanning several pages
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        for &model_id in &model_ids[1..] {
            let key = CacheKey::Record {
                user_id: user_id.to_string(),
                model_id,
            };
            let _: () = conn.del(key.to_string()).await.unwrap();
        }

        let latest = cache.get_latest(user_id).await.unwrap().unwrap();
        assert_eq!(latest.model_id, model_ids[0]);

        cleanup(&client, user_id, &model_ids).await;
    }
}
