use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::dialogue::DialogueEngine;
use crate::services::identity::{CredentialSigner, SqliteIdentityVerifier};
use crate::services::nlu::KeywordExtractor;
use crate::services::notify::Notifier;
use crate::services::sessions::{InMemorySessionStore, SessionStore};

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub sessions: Box<dyn SessionStore>,
    pub dialogue: DialogueEngine,
    pub credentials: CredentialSigner,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(conn: Connection, config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let credentials = CredentialSigner::new(
            &config.credential_secret,
            chrono::Duration::minutes(config.credential_ttl_minutes),
        );
        let identity = SqliteIdentityVerifier::new(Arc::clone(&db), credentials.clone());
        let dialogue = DialogueEngine::new(
            Arc::clone(&db),
            Arc::new(identity),
            Arc::new(KeywordExtractor::new()),
            Arc::clone(&notifier),
        );
        let sessions = InMemorySessionStore::new(Duration::from_secs(
            config.session_idle_minutes * 60,
        ));

        Self {
            db,
            sessions: Box::new(sessions),
            dialogue,
            credentials,
            notifier,
        }
    }
}
