use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reciprocal_rec::{
    api::{create_router, AppState},
    config::{CacheBackend, Config, ServiceRole},
    db::{
        create_redis_client, InMemoryRecommendationCache, ParameterStore, RecommendationCache,
        RedisParameterStore, RedisRecommendationCache, StaticParameterStore,
    },
    services::{
        FileReferenceSource, HttpInferenceClient, InferenceEndpoint, ModelHolder, QueryRouter,
        RecommendationService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(role = ?config.role, "Starting recommendation service");

    let recommender = match config.role {
        ServiceRole::Inference | ServiceRole::Combined => Some(build_recommender(&config)),
        ServiceRole::Query => None,
    };

    let mut state = AppState::new();
    if config.role != ServiceRole::Inference {
        let inference: Arc<dyn InferenceEndpoint> = match &recommender {
            Some(service) => service.clone() as Arc<dyn InferenceEndpoint>,
            None => {
                let url = config
                    .inference_url
                    .as_deref()
                    .context("INFERENCE_URL is required when ROLE=query")?;
                Arc::new(HttpInferenceClient::new(
                    url,
                    Duration::from_millis(config.inference_timeout_ms),
                )?)
            }
        };
        state = state.with_queries(Arc::new(build_query_router(&config, inference)?));
    }
    if let Some(service) = recommender {
        state = state.with_recommender(service);
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_recommender(config: &Config) -> Arc<RecommendationService> {
    let source = Arc::new(FileReferenceSource::new(config.model_dir.clone()));
    let holder = Arc::new(ModelHolder::new(source, config.index_params()));

    // Start loading now; requests arriving earlier wait on the same load
    let warm = holder.clone();
    tokio::spawn(async move {
        if let Err(e) = warm.get().await {
            tracing::warn!(error = %e, "Model warm-up failed, retrying on next request");
        }
    });

    Arc::new(RecommendationService::new(holder, config.recommendation_count))
}

fn build_query_router(
    config: &Config,
    inference: Arc<dyn InferenceEndpoint>,
) -> anyhow::Result<QueryRouter> {
    let cache: Arc<dyn RecommendationCache> = match config.cache_backend {
        CacheBackend::Redis => Arc::new(RedisRecommendationCache::new(create_redis_client(
            &config.redis_url,
        )?)),
        CacheBackend::Memory => Arc::new(InMemoryRecommendationCache::new()),
    };

    let parameters: Arc<dyn ParameterStore> = match config.retrain_freq_days {
        Some(days) => Arc::new(StaticParameterStore::new(days)),
        None => Arc::new(RedisParameterStore::new(
            create_redis_client(&config.redis_url)?,
            config.retrain_freq_param.clone(),
        )),
    };

    tracing::info!(
        cache = cache.name(),
        inference = inference.name(),
        timeout_ms = config.inference_timeout_ms,
        "Query router configured"
    );

    Ok(QueryRouter::new(
        cache,
        inference,
        parameters,
        Duration::from_millis(config.inference_timeout_ms),
    ))
}
