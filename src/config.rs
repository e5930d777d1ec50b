use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub session_idle_minutes: u64,
    pub credential_secret: String,
    pub credential_ttl_minutes: i64,
    /// Empty means notifications are only logged.
    pub notify_webhook_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "clinic.db".to_string()),
            session_idle_minutes: env::var("SESSION_IDLE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            credential_secret: env::var("CREDENTIAL_SECRET")
                .unwrap_or_else(|_| "changeme".to_string()),
            credential_ttl_minutes: env::var("CREDENTIAL_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
        }
    }
}
