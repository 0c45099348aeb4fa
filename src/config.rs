//! Library-wide configuration.
//!
//! Initialization-time settings threaded into the pipeline and stream
//! constructors: the production base URL and the default token endpoint.

/// Per-request timeout used by the request pipeline's HTTP client.
pub const PIPELINE_TIMEOUT_SECS: u64 = 20;

/// Per-request timeout used by the event stream's dedicated HTTP client.
/// The stream is expected to sit silent for long stretches between
/// events, so a missing byte for an hour is what marks the connection
/// dead, not a short read timeout.
pub const STREAM_TIMEOUT_SECS: u64 = 3_600;

/// Default page size used internally by [`crate::pagination::send_all`]
/// when walking every page of a paginated endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Library-wide configuration, constructed once by the caller.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub default_auth_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://api.sensor-cloud.example.com/v2".to_string(),
            default_auth_url: "https://identity.sensor-cloud.example.com/v2/auth".to_string(),
        }
    }
}

impl Config {
    pub fn new(base_url: impl Into<String>, default_auth_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_auth_url: default_auth_url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_production_endpoints() {
        let cfg = Config::default();
        assert!(cfg.base_url.starts_with("https://"));
        assert!(cfg.default_auth_url.starts_with("https://"));
    }
}
