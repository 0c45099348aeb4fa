//! Basic authenticator: a constant token derived from credentials.

use super::{AuthToken, Authenticator, Credentials};
use crate::error::{Error, ErrorKind};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as AsyncMutex;

/// Authenticator whose token never actually expires: `expiresAt = +∞`.
/// `refresh()` synthesizes `"Basic " + base64(keyID:secret)`.
pub struct BasicAuthenticator {
    credentials: Credentials,
    token: StdMutex<Option<AuthToken>>,
    auto_refresh_enabled: AtomicBool,
    refresh_lock: AsyncMutex<()>,
}

impl BasicAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token: StdMutex::new(None),
            auto_refresh_enabled: AtomicBool::new(false),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    fn synthesize_token(&self) -> AuthToken {
        let raw = format!(
            "{}:{}",
            self.credentials.key_id,
            self.credentials.secret.expose_secret()
        );
        let token = format!("Basic {}", BASE64_STANDARD.encode(raw));
        AuthToken {
            token,
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }

    fn cached(&self) -> Option<AuthToken> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn login(&self) -> Result<(), Error> {
        self.refresh().await?;
        self.auto_refresh_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) {
        *self.token.lock().unwrap() = None;
        self.auto_refresh_enabled.store(false, Ordering::SeqCst);
    }

    async fn refresh(&self) -> Result<(), Error> {
        let token = self.synthesize_token();
        *self.token.lock().unwrap() = Some(token);
        Ok(())
    }

    async fn get_active(&self) -> Result<String, Error> {
        if !self.auto_refresh_enabled.load(Ordering::SeqCst) {
            return Err(Error::logged_out());
        }

        let now = Utc::now();
        if let Some(t) = self.cached()
            && t.is_fresh(now)
        {
            return Ok(t.token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Double-checked: another task may have refreshed while we waited.
        if let Some(t) = self.cached()
            && t.is_fresh(now)
        {
            return Ok(t.token);
        }

        self.refresh().await?;

        match self.cached() {
            Some(t) if t.is_fresh(Utc::now()) => Ok(t.token),
            _ => Err(Error::new(ErrorKind::UnknownError)),
        }
    }
}
