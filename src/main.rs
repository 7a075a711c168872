use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use linklet::classify::WootheeClassifier;
use linklet::clicks::ClickRecorder;
use linklet::config::Config;
use linklet::http::{create_redirect_router, AppState};
use linklet::resolver::RedirectResolver;
use linklet::storage::{CachedStore, SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let sqlite = Arc::new(
        SqliteStore::new(&config.database.url, config.database.max_connections).await?,
    );
    info!("Using SQLite storage: {}", config.database.url);

    let store: Arc<dyn Store> = if config.cache.enabled {
        info!(
            "Lookup cache enabled ({} entries, {}s TTL)",
            config.cache.max_entries, config.cache.ttl_secs
        );
        Arc::new(CachedStore::new(
            sqlite,
            config.cache.max_entries,
            config.cache.ttl_secs,
        ))
    } else {
        sqlite
    };

    info!("Initializing database...");
    store.init().await?;
    info!("Database initialized successfully");

    let resolver = RedirectResolver::new(Arc::clone(&store));
    let recorder = Arc::new(ClickRecorder::new(
        Arc::clone(&store),
        Arc::new(WootheeClassifier::new()),
    ));

    let state = Arc::new(AppState { resolver, recorder });
    let router = create_redirect_router(state);

    let addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Redirect server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
