//! Client library for a sensor-cloud REST API: authenticated requests,
//! transparent pagination, and a self-healing event stream.
//!
//! This crate implements the request pipeline and the event streaming
//! engine; the dozens of thin resource wrappers (devices, projects,
//! organizations, data connectors, ...) that merely build a [`Request`]
//! and decode a response are out of scope here and layer on top.
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod pagination;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod stream;

pub use auth::{AuthToken, Authenticator, Credentials};
pub use config::Config;
pub use error::{Error, ErrorKind};
pub use pagination::PagedResult;
pub use pipeline::RequestPipeline;
pub use request::Request;
pub use retry::RetryScheme;
pub use stream::{EventStream, StreamState};
