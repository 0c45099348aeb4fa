//! OAuth2-JWT authenticator: trades a signed JWT assertion for a bearer
//! token at an authorization endpoint.

use super::{AuthToken, Authenticator, Credentials};
use crate::error::{Error, ErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    aud: String,
    iss: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    expires_in: i64,
}

/// Authenticator that obtains a bearer token by posting a signed JWT
/// assertion (`grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer`) to
/// `auth_url`.
pub struct OAuth2Authenticator {
    credentials: Credentials,
    auth_url: String,
    http: reqwest::Client,
    token: StdMutex<Option<AuthToken>>,
    auto_refresh_enabled: AtomicBool,
    refresh_lock: AsyncMutex<()>,
}

impl OAuth2Authenticator {
    pub fn new(credentials: Credentials, auth_url: impl Into<String>) -> Self {
        Self::with_client(credentials, auth_url, reqwest::Client::new())
    }

    pub fn with_client(
        credentials: Credentials,
        auth_url: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            credentials,
            auth_url: auth_url.into(),
            http,
            token: StdMutex::new(None),
            auto_refresh_enabled: AtomicBool::new(false),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    fn cached(&self) -> Option<AuthToken> {
        self.token.lock().unwrap().clone()
    }

    fn build_assertion(&self) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            iat: now.timestamp(),
            exp: (now + ChronoDuration::seconds(3600)).timestamp(),
            aud: self.auth_url.clone(),
            iss: self.credentials.email.clone(),
        };
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.credentials.key_id.clone());
        let key = EncodingKey::from_secret(self.credentials.secret.expose_secret().as_bytes());
        encode(&header, &claims, &key)
            .map_err(|e| Error::with_message(ErrorKind::UnknownError, format!("failed to sign JWT assertion: {e}")))
    }

    async fn fetch_token(&self) -> Result<AuthToken, Error> {
        let assertion = self.build_assertion()?;
        let form = [
            (
                "grant_type",
                "urn:ietf:params:oauth:grant-type:jwt-bearer",
            ),
            ("assertion", assertion.as_str()),
        ];

        let resp = self
            .http
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::server_unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::with_message(
                ErrorKind::UnknownError,
                format!("token endpoint returned {status}: {body}"),
            ));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::unknown_error(format!("failed to parse token response: {e}")))?;

        Ok(AuthToken {
            token: format!("Bearer {}", body.access_token),
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
        })
    }
}

#[async_trait]
impl Authenticator for OAuth2Authenticator {
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
        let token = self.fetch_token().await?;
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
