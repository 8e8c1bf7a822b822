// Service modules
pub mod commands;
pub mod config;
pub mod server;

// Database modules
pub mod db;
pub mod db_types;
pub mod error;

// Job modules
pub mod jobs;
pub mod load;
pub mod transfer;

use config::ServiceConfig;
use db_types::{AppState, StoreRole};

/// Build shared state, apply preconfigured stores and serve until shutdown.
pub async fn run(config: ServiceConfig) -> std::io::Result<()> {
    let state = AppState::new(config.engine_settings(), config.connection_settings());

    let preconfigured = [
        (StoreRole::Target, config.target_database_url.as_deref()),
        (StoreRole::Source, config.source_database_url.as_deref()),
    ];
    for (role, url) in preconfigured {
        if let Some(url) = url {
            if let Err(err) = state.connections.configure(role, url).await {
                log::warn!("Ignoring {} database URL: {}", role.label(), err);
            }
        }
    }

    let app = server::build_router(state, config.max_upload_bytes());
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("pgferry listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await
}
