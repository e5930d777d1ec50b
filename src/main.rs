use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use clinicbot::config::AppConfig;
use clinicbot::db;
use clinicbot::handlers;
use clinicbot::services::notify::webhook::WebhookNotifier;
use clinicbot::services::notify::{LogNotifier, Notifier};
use clinicbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    if config.credential_secret == "changeme" {
        tracing::warn!("CREDENTIAL_SECRET is not set, using the development default");
    }

    let conn = db::init_db(&config.database_url)?;

    let notifier: Arc<dyn Notifier> = if config.notify_webhook_url.is_empty() {
        tracing::info!("appointment notifications will be logged only");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("sending appointment notifications to {}", config.notify_webhook_url);
        Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    let state = Arc::new(AppState::new(conn, &config, notifier));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
