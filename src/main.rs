use std::sync::Arc;

use moviematch_api::{
    cache::{create_redis_client, Cache},
    config::Config,
    routes::{create_router, AppState},
    services::{
        providers::{AnthropicClient, LanguageModel, MovieCatalog, OmdbClient, TmdbClient},
        RecommendationSettings, Recommender,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moviematch_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (cache, cache_handle) = if config.cache_enabled {
        Cache::new(create_redis_client(&config.redis_url)?)
    } else {
        Cache::disabled()
    };
    tracing::info!(
        enabled = cache.is_enabled(),
        redis_url = %config.redis_url,
        "Cache configured"
    );

    let catalog: Arc<dyn MovieCatalog> = Arc::new(TmdbClient::from_config(&config, cache.clone()));
    let ratings = Arc::new(OmdbClient::from_config(&config, cache));
    let language_model = AnthropicClient::from_config(&config)
        .map(|client| Arc::new(client) as Arc<dyn LanguageModel>);

    if config.omdb_api_key.is_none() {
        tracing::warn!("OMDB_API_KEY not set, ratings will be empty");
    }
    match &language_model {
        Some(model) => tracing::info!(provider = model.name(), model = %config.llm_model, "Language model configured"),
        None => tracing::warn!("ANTHROPIC_API_KEY not set, falling back to catalog search"),
    }

    let recommender = Recommender::new(
        catalog.clone(),
        ratings,
        language_model,
        RecommendationSettings::from_config(&config),
    );
    let app = create_router(Arc::new(AppState::new(recommender)));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        catalog = catalog.name(),
        region = %config.watch_region,
        "Server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
