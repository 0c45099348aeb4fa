//! Request Value
//!
//! An immutable description of one HTTP call: method, URL parts, headers,
//! query parameters, and an optional body. Built once by the caller and
//! handed to the pipeline, the pagination driver, or the event stream.

use crate::error::Error;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

/// One HTTP call, immutable except through [`Request::set_header`].
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) base_url: String,
    pub(crate) endpoint: String,
    pub(crate) headers: HeaderMap,
    /// Insertion-ordered `(name, value)` pairs; a name may repeat to
    /// produce multiple query-string entries, preserving per-name order.
    pub(crate) params: Vec<(String, String)>,
    pub(crate) body: Option<Vec<u8>>,
}

impl Request {
    /// Build a request with no body; no `Content-Type` is injected.
    pub fn new(method: Method, base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Build a request whose body is used as-is (no `Content-Type` injected;
    /// callers set one explicitly via [`Request::set_header`] if needed).
    pub fn with_raw_body(
        method: Method,
        base_url: impl Into<String>,
        endpoint: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            body: Some(body),
            ..Self::new(method, base_url, endpoint)
        }
    }

    /// Build a request whose body is JSON-serialized; `Content-Type:
    /// application/json` is upserted into the header set.
    pub fn with_json_body<T: serde::Serialize>(
        method: Method,
        base_url: impl Into<String>,
        endpoint: impl Into<String>,
        body: &T,
    ) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::unknown_error(format!("failed to encode request body: {e}")))?;
        let mut req = Self::with_raw_body(method, base_url, endpoint, bytes);
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(req)
    }

    /// Case-preserving upsert keyed by field name.
    pub fn set_header(&mut self, field: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::from_bytes(field.as_bytes())
            .map_err(|e| Error::unknown_error(format!("invalid header name '{field}': {e}")))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| Error::unknown_error(format!("invalid header value: {e}")))?;
        self.headers.insert(name, val);
        Ok(())
    }

    /// Append a query parameter, preserving insertion order for repeats of
    /// the same name.
    pub fn push_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }

    /// Concatenate `base_url + endpoint` and append query parameters in
    /// insertion order. Fails with `unknownError` if the result is not a
    /// valid URL.
    pub(crate) fn build_url(&self) -> Result<reqwest::Url, Error> {
        let joined = format!("{}{}", self.base_url, self.endpoint);
        let mut url = reqwest::Url::parse(&joined)
            .map_err(|e| Error::unknown_error(format!("malformed request URL '{joined}': {e}")))?;
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_is_case_preserving_upsert() {
        let mut req = Request::new(Method::GET, "https://api.example.com", "/devices");
        req.set_header("X-Custom", "one").unwrap();
        req.set_header("X-Custom", "two").unwrap();
        let values: Vec<_> = req.headers.get_all("X-Custom").iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "two");
    }

    #[test]
    fn json_body_upserts_content_type() {
        let req = Request::with_json_body(
            Method::POST,
            "https://api.example.com",
            "/devices",
            &serde_json::json!({"name": "d1"}),
        )
        .unwrap();
        assert_eq!(req.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn raw_body_does_not_inject_content_type() {
        let req = Request::with_raw_body(
            Method::POST,
            "https://api.example.com",
            "/devices",
            b"raw".to_vec(),
        );
        assert!(req.headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn params_preserve_insertion_order_per_name() {
        let mut req = Request::new(Method::GET, "https://api.example.com", "/devices");
        req.push_param("tag", "a");
        req.push_param("tag", "b");
        req.push_param("page_size", "10");
        let url = req.build_url().unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/devices?tag=a&tag=b&page_size=10");
    }

    #[test]
    fn malformed_url_is_rejected() {
        let req = Request::new(Method::GET, "not a url", "/devices");
        assert!(req.build_url().is_err());
    }
}
