//! Federation Plane Server Binary

use fedtrust_bridge::{HttpFetcher, HttpFetcherConfig};
use fedtrust_core::{
    FederationOperator, FsBundleStore, FsStatementStore, KeyBundleStore, MemoryStore, NoFetcher,
    RemoteFetcher, StatementStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fedtrust_plane::{create_router, spawn_key_rotation, AppState, PlaneConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PlaneConfig::from_env()?;

    // Initialize logging
    let log_level: Level = config.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize storage
    let bundles: Arc<dyn KeyBundleStore> = match &config.bundle_dir {
        Some(dir) => Arc::new(FsBundleStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };
    let statements: Arc<dyn StatementStore> = match &config.statement_dir {
        Some(dir) => Arc::new(FsStatementStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };
    let fetcher: Arc<dyn RemoteFetcher> = match &config.fetch_base_url {
        Some(url) => Arc::new(HttpFetcher::new(HttpFetcherConfig::new(url))?),
        None => Arc::new(NoFetcher),
    };

    let mut state = AppState::new(config.clone(), bundles.clone(), statements, fetcher.clone());

    if let Some(hosted) = &config.operator {
        let operator = FederationOperator::new(
            hosted.issuer.clone(),
            hosted.key_defs.clone(),
            chrono::Duration::seconds(hosted.remove_after_secs as i64),
            bundles.clone(),
            fetcher,
        )?;
        operator.publish_keys(bundles.as_ref()).await?;
        spawn_key_rotation(operator.clone(), bundles.clone(), Duration::from_secs(hosted.rotate_secs));

        info!(
            issuer = %hosted.issuer,
            rotate_secs = hosted.rotate_secs,
            remove_after_secs = hosted.remove_after_secs,
            keys = hosted.key_defs.len(),
            "Hosting federation operator"
        );
        state = state.with_operator(operator);
    }

    info!(
        port = config.port,
        anchors = ?config.trust_anchors,
        bundle_dir = ?config.bundle_dir,
        statement_dir = ?config.statement_dir,
        "Starting federation plane server"
    );

    let app = create_router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Federation plane listening");

    axum::serve(listener, app).await?;
    Ok(())
}
