//! Request Pipeline
//!
//! Authenticate → send → classify response → retry-on-429 → decode. The
//! pipeline never backs off on network errors or 5xx: those are surfaced
//! to the caller immediately. Only 429 is retried, and unboundedly so —
//! the server's continuing choice to rate-limit is the only terminator.

use crate::error::{Error, ErrorKind, ErrorBody, StatusOutcome, classify_status};
use crate::request::Request;
use crate::{Authenticator, config};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Authenticated HTTP exchange with 429-aware retry and JSON decoding.
pub struct RequestPipeline {
    http: reqwest::Client,
    authenticator: Arc<dyn Authenticator>,
}

impl RequestPipeline {
    /// Build a pipeline with the default 20s request/resource timeouts.
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::PIPELINE_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(config::PIPELINE_TIMEOUT_SECS))
            .build()
            .expect("default pipeline client config is always valid");
        Self::with_client(authenticator, http)
    }

    pub fn with_client(authenticator: Arc<dyn Authenticator>, http: reqwest::Client) -> Self {
        Self { http, authenticator }
    }

    pub(crate) fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// Authenticate, send, and expect an empty body.
    pub async fn send(&self, request: &Request) -> Result<(), Error> {
        self.execute(request).await?;
        Ok(())
    }

    /// Authenticate, send, and JSON-decode the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &Request) -> Result<T, Error> {
        let bytes = self.execute(request).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::unknown_error(format!("failed to decode response body: {e}")))
    }

    /// Run one request through the full pipeline, retrying indefinitely on
    /// 429, and return the raw success body.
    ///
    /// Authentication happens exactly once, before the loop: a 429 retry
    /// resends the identical request (same headers, same `Authorization`)
    /// after sleeping `Retry-After`, per §4.E — it never re-authenticates.
    pub(crate) async fn execute(&self, request: &Request) -> Result<Vec<u8>, Error> {
        let token = self.authenticator.get_active().await?;
        let auth_value = HeaderValue::from_str(&token)
            .map_err(|e| Error::unknown_error(format!("invalid token value: {e}")))?;
        let url = request.build_url()?;

        loop {
            let mut builder = self.http.request(request.method.clone(), url.clone());
            builder = builder.headers(request.headers.clone());
            builder = builder.header(AUTHORIZATION, auth_value.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "request pipeline: transport failure");
                    return Err(Error::server_unavailable(e.to_string()));
                }
            };

            let status = response.status().as_u16();
            let headers = response.headers().clone();

            match classify_status(status, &headers) {
                StatusOutcome::Success => {
                    return response
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|e| Error::unknown_error(format!("failed to read response body: {e}")));
                }
                StatusOutcome::TooManyRequests { retry_after } => {
                    tracing::debug!(retry_after, "request pipeline: rate limited, backing off");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                StatusOutcome::Mapped(kind) => {
                    return Err(self.map_error_body(kind, response).await);
                }
                StatusOutcome::Unknown => {
                    return Err(self.map_error_body(ErrorKind::UnknownError, response).await);
                }
            }
        }
    }

    async fn map_error_body(&self, kind: ErrorKind, response: reqwest::Response) -> Error {
        let bytes = response.bytes().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        tracing::warn!(?kind, error = ?body.error, "request pipeline: mapped error response");
        Error::with_details(kind, body.error, body.help)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::auth::basic::BasicAuthenticator;
    use reqwest::Method;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn pipeline_with_basic_auth() -> RequestPipeline {
        let auth = Arc::new(BasicAuthenticator::new(Credentials::new("e", "k", "s")));
        auth.login().await.unwrap();
        RequestPipeline::new(auth)
    }

    /// Wraps a real authenticator and counts `get_active` calls, so tests
    /// can assert a 429 retry resends rather than re-authenticating.
    struct CountingAuthenticator {
        inner: BasicAuthenticator,
        get_active_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn login(&self) -> Result<(), Error> {
            self.inner.login().await
        }

        async fn logout(&self) {
            self.inner.logout().await
        }

        async fn refresh(&self) -> Result<(), Error> {
            self.inner.refresh().await
        }

        async fn get_active(&self) -> Result<String, Error> {
            self.get_active_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get_active().await
        }
    }

    #[tokio::test]
    async fn retry_after_429_reuses_the_same_token_without_reauthenticating() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"x": 7})))
            .mount(&server)
            .await;

        let auth = Arc::new(CountingAuthenticator {
            inner: BasicAuthenticator::new(Credentials::new("e", "k", "s")),
            get_active_calls: std::sync::atomic::AtomicUsize::new(0),
        });
        auth.login().await.unwrap();
        let pipeline = RequestPipeline::new(auth.clone());

        let req = Request::new(Method::GET, server.uri(), "/x");
        #[derive(serde::Deserialize)]
        struct Body {
            x: i64,
        }
        let body: Body = pipeline.send_json(&req).await.unwrap();
        assert_eq!(body.x, 7);
        assert_eq!(
            auth.get_active_calls.load(std::sync::atomic::Ordering::SeqCst),
            1,
            "429 retries must resend the same authenticated request, not re-authenticate"
        );
    }

    #[tokio::test]
    async fn send_json_decodes_2xx_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"x": 7})))
            .mount(&server)
            .await;

        let pipeline = pipeline_with_basic_auth().await;
        let req = Request::new(Method::GET, server.uri(), "/x");
        #[derive(serde::Deserialize)]
        struct Body {
            x: i64,
        }
        let body: Body = pipeline.send_json(&req).await.unwrap();
        assert_eq!(body.x, 7);
    }

    #[tokio::test]
    async fn retries_indefinitely_on_429_honoring_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"x": 7})))
            .mount(&server)
            .await;

        let pipeline = pipeline_with_basic_auth().await;
        let req = Request::new(Method::GET, server.uri(), "/x");
        let started = std::time::Instant::now();
        #[derive(serde::Deserialize)]
        struct Body {
            x: i64,
        }
        let body: Body = pipeline.send_json(&req).await.unwrap();
        assert_eq!(body.x, 7);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn maps_404_to_not_found_with_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "no such device",
                "code": 404,
                "help": "https://docs.example.com/errors#not-found",
            })))
            .mount(&server)
            .await;

        let pipeline = pipeline_with_basic_auth().await;
        let req = Request::new(Method::GET, server.uri(), "/missing");
        let err = pipeline.send(&req).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message.as_deref(), Some("no such device"));
    }

    #[tokio::test]
    async fn does_not_retry_on_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oops"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = pipeline_with_basic_auth().await;
        let req = Request::new(Method::GET, server.uri(), "/oops");
        let err = pipeline.send(&req).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerError);
    }
}
