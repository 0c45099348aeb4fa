//! Authenticator capability.
//!
//! `Authenticator` is the pipeline- and stream-facing contract for obtaining
//! access tokens. It is object-safe so both the [`crate::pipeline::RequestPipeline`]
//! and [`crate::stream::EventStream`] can share one implementation behind an
//! `Arc<dyn Authenticator>`.

pub mod basic;
pub mod oauth2;

use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Minimum remaining lifetime a cached token must have to be handed to the
/// pipeline; shorter-lived tokens trigger a refresh.
pub(crate) const FRESHNESS_WINDOW_SECS: i64 = 60;

/// Opaque credential triple. Immutable; used only as input to an
/// [`Authenticator`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub key_id: String,
    pub secret: SecretString,
}

impl Credentials {
    pub fn new(
        email: impl Into<String>,
        key_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            key_id: key_id.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

/// A scheme-prefixed access token (`"Basic ..."` or `"Bearer ..."`) and its
/// expiry instant.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// True when this token has more than [`FRESHNESS_WINDOW_SECS`] left
    /// before it expires.
    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.expires_at - now).num_seconds() > FRESHNESS_WINDOW_SECS
    }
}

/// Token-provider capability shared by the pipeline and the event stream.
///
/// Implementations hold an optional current [`AuthToken`] and a boolean
/// auto-refresh flag internally; this trait only exposes the lifecycle
/// operations, per §4.C of the specification.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Populate the token and enable auto-refresh.
    async fn login(&self) -> Result<(), Error>;

    /// Clear the cached token and disable auto-refresh.
    async fn logout(&self);

    /// Unconditionally fetch a new token.
    async fn refresh(&self) -> Result<(), Error>;

    /// Pipeline-facing accessor: return a fresh cached token, refreshing
    /// first if necessary. Fails with `LoggedOut` if auto-refresh is
    /// disabled, or with whatever error `refresh()` produced otherwise.
    async fn get_active(&self) -> Result<String, Error>;
}
