use std::sync::{Arc, Mutex, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::db::queries;
use crate::models::{Account, Role, Subject};

type HmacSha256 = Hmac<Sha256>;

/// Confirms who is on the other end of a conversation before booking unlocks.
pub trait IdentityVerifier: Send + Sync {
    fn resolve(&self, account_ref: &str) -> anyhow::Result<Option<Account>>;

    fn self_subject(&self, account_id: i64) -> anyhow::Result<Option<Subject>>;

    fn list_dependents(&self, account_id: i64) -> anyhow::Result<Vec<Subject>>;

    /// Exact comparison against the stored date of birth.
    fn match_secret(&self, subject_id: i64, candidate: NaiveDate) -> anyhow::Result<bool>;

    fn issue_credential(
        &self,
        requester_id: i64,
        subject_id: i64,
        role: Role,
    ) -> anyhow::Result<String>;
}

pub struct SqliteIdentityVerifier {
    db: Arc<Mutex<Connection>>,
    signer: CredentialSigner,
}

impl SqliteIdentityVerifier {
    pub fn new(db: Arc<Mutex<Connection>>, signer: CredentialSigner) -> Self {
        Self { db, signer }
    }
}

impl IdentityVerifier for SqliteIdentityVerifier {
    fn resolve(&self, account_ref: &str) -> anyhow::Result<Option<Account>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::get_account_by_username(&db, account_ref.trim())
    }

    fn self_subject(&self, account_id: i64) -> anyhow::Result<Option<Subject>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::get_self_subject(&db, account_id)
    }

    fn list_dependents(&self, account_id: i64) -> anyhow::Result<Vec<Subject>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::list_dependents(&db, account_id)
    }

    fn match_secret(&self, subject_id: i64, candidate: NaiveDate) -> anyhow::Result<bool> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let subject = queries::get_subject(&db, subject_id)?;
        Ok(subject.is_some_and(|s| s.date_of_birth == candidate))
    }

    fn issue_credential(
        &self,
        requester_id: i64,
        subject_id: i64,
        role: Role,
    ) -> anyhow::Result<String> {
        Ok(self.signer.issue(requester_id, subject_id, role)?)
    }
}

// ── Credentials ──

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("malformed credential")]
    Malformed,

    #[error("invalid credential signature")]
    BadSignature,

    #[error("credential expired")]
    Expired,

    #[error("invalid signing key")]
    Key,
}

/// What a credential grants: acting as `requester` on behalf of `subject`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub requester: i64,
    pub subject: i64,
    pub role: Role,
    /// Unix seconds.
    pub exp: i64,
}

/// Issues and checks `base64url(claims).base64url(hmac)` tokens.
#[derive(Clone)]
pub struct CredentialSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl CredentialSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, CredentialError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| CredentialError::Key)
    }

    pub fn issue(&self, requester: i64, subject: i64, role: Role) -> Result<String, CredentialError> {
        let claims = Claims {
            requester,
            subject,
            role,
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, CredentialError> {
        let payload = serde_json::to_vec(claims).map_err(|_| CredentialError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        let (payload, signature) = token.split_once('.').ok_or(CredentialError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CredentialError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::BadSignature)?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CredentialError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&bytes).map_err(|_| CredentialError::Malformed)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(CredentialError::Expired);
        }
        Ok(claims)
    }
}
