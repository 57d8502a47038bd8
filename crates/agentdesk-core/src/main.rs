use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentdesk_core::config::{Config, ProxyBackend, SettingsBackend};
use agentdesk_core::proxy::{DocumentConnector, MemoryConnector, MongoConnector};
use agentdesk_core::server::{self, AppState};
use agentdesk_core::settings::{MemorySettingsStore, PgSettingsStore, SettingsStore};

fn run_migrations(database_url: &str) -> Result<()> {
    use diesel::prelude::*;
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
    pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = diesel::PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    info!("Database migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "agentdesk=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("AgentDesk proxy starting up...");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Configuration loaded");
    info!("  Proxy backend: {:?}", config.proxy_backend);
    info!("  Settings backend: {:?}", config.settings_backend);

    let settings: Arc<dyn SettingsStore> = match config.settings_backend {
        SettingsBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not set"))?;
            run_migrations(database_url)?;
            Arc::new(PgSettingsStore::connect(database_url)?)
        }
        SettingsBackend::Memory => {
            warn!("Settings are kept in memory and will be lost on restart");
            Arc::new(MemorySettingsStore::new())
        }
    };

    let connector: Arc<dyn DocumentConnector> = match config.proxy_backend {
        ProxyBackend::MongoDb => Arc::new(MongoConnector),
        ProxyBackend::Memory => {
            warn!("Proxy is serving an in-memory document store");
            Arc::new(MemoryConnector::new())
        }
    };

    if config.proxy_api_key.is_none() {
        warn!("PROXY_API_KEY not set - proxy and settings routes are open to anyone");
    }
    if config.default_mongodb_uri.is_some() {
        info!("MONGODB_URI set - used when requests carry no URI");
    }

    let state = AppState::new(connector, settings)
        .with_api_key(config.proxy_api_key.clone())
        .with_default_mongodb_uri(config.default_mongodb_uri.clone());
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    info!("Listening on port {}", config.http_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    info!("AgentDesk proxy has shut down.");
    Ok(())
}
