use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use animedex_core::{
    build_sources, load_config, validate_config, AnimeAggregator, AnimeCache, AnimeStore,
    SqliteAnimeStore,
};
use animedex_server::api::create_router;
use animedex_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("animedex {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("ANIMEDEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Create SQLite anime store
    let store: Arc<dyn AnimeStore> = Arc::new(
        SqliteAnimeStore::new(&config.database.path).context("Failed to create anime store")?,
    );
    info!("Anime store initialized");

    // Create source adapters in priority order
    let sources = build_sources(&config.sources).context("Failed to create source adapters")?;
    info!(
        "Source adapters: {}",
        sources
            .iter()
            .map(|s| s.provider().as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    // Create cache and aggregator
    let cache = Arc::new(AnimeCache::new(config.cache.max_entries));
    let aggregator = Arc::new(AnimeAggregator::new(
        sources,
        store,
        Arc::clone(&cache),
        config.aggregator.clone(),
        config.cache.clone(),
    ));

    // Warm the hot lists without delaying startup
    if config.cache.warmup_on_start {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move {
            aggregator.warm_up().await;
        });
    } else {
        info!("Cache warm-up on start disabled");
    }

    // Sweep expired entries periodically
    let sweeper = (config.cache.purge_interval_secs > 0).then(|| {
        let cache = Arc::clone(&cache);
        let period = Duration::from_secs(config.cache.purge_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = cache.purge_expired().await;
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        })
    });

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), aggregator));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
