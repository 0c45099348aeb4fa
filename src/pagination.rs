//! Pagination Driver
//!
//! Single-page (`send_page`) and auto-paging (`send_all`) variants layered
//! on top of the [`RequestPipeline`]. Decoding uses a paging-key remap:
//! the root key named by the caller (e.g. `"devices"`) is rewritten to
//! `"results"` before binding to [`PagedResult<T>`], the same
//! JSON-massaging technique the teacher's streaming layer uses for its
//! response-shape repairs.

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::Error;
use crate::pipeline::RequestPipeline;
use crate::request::Request;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// One page of results plus an optional continuation token.
#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub results: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RawPagedResult<T> {
    #[serde(default)]
    results: Vec<T>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: String,
}

/// Rewrite the root key named `paging_key` to `"results"` so the page
/// decodes uniformly regardless of what the endpoint calls its array.
fn remap_paging_key(mut value: serde_json::Value, paging_key: &str) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value
        && paging_key != "results"
        && let Some(items) = map.remove(paging_key)
    {
        map.insert("results".to_string(), items);
    }
    value
}

/// Fetch a single page. Sets `page_size` and, if provided, `page_token` as
/// query parameters. An empty wire `nextPageToken` normalizes to `None`.
pub async fn send_page<T: DeserializeOwned>(
    pipeline: &RequestPipeline,
    mut request: Request,
    page_size: u32,
    page_token: Option<&str>,
    paging_key: &str,
) -> Result<PagedResult<T>, Error> {
    request.push_param("page_size", page_size.to_string());
    if let Some(token) = page_token {
        request.push_param("page_token", token.to_string());
    }

    let bytes = pipeline.execute(&request).await?;
    let raw: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::unknown_error(format!("failed to decode page body: {e}")))?;
    let remapped = remap_paging_key(raw, paging_key);
    let page: RawPagedResult<T> = serde_json::from_value(remapped)
        .map_err(|e| Error::unknown_error(format!("failed to decode page body: {e}")))?;

    Ok(PagedResult {
        results: page.results,
        next_page_token: if page.next_page_token.is_empty() {
            None
        } else {
            Some(page.next_page_token)
        },
    })
}

/// Walk every page of a paginated endpoint, threading `nextPageToken` into
/// each subsequent request, and return the concatenated results in page
/// order. Each page is independently re-authenticated, so a token that
/// refreshes mid-walk is handled transparently.
pub async fn send_all<T: DeserializeOwned>(
    pipeline: &RequestPipeline,
    request_template: impl Fn() -> Request,
    paging_key: &str,
) -> Result<Vec<T>, Error> {
    let mut accumulator = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page: PagedResult<T> = send_page(
            pipeline,
            request_template(),
            DEFAULT_PAGE_SIZE,
            token.as_deref(),
            paging_key,
        )
        .await?;

        accumulator.extend(page.results);
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(accumulator)
}
