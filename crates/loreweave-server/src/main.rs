mod config;

use std::sync::Arc;

use tracing::info;

use loreweave_api::AppStateInner;
use loreweave_api::verification::LogMailer;
use loreweave_db::Database;
use loreweave_gateway::{Dispatcher, Notifier};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "loreweave=debug,loreweave_api=debug,loreweave_db=debug,loreweave_gateway=debug,tower_http=debug"
                        .into()
                }),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let dispatcher = Dispatcher::new();
    let notifier = Notifier::new(db.clone(), dispatcher);
    let state = AppStateInner::new(
        db,
        config.jwt_secret.clone(),
        notifier,
        Arc::new(LogMailer),
        config.code_ttl,
    );

    let app = loreweave_api::router(state);

    info!("Loreweave server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
