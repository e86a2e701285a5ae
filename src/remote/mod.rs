//! Remote item authority: the server that owns item truth.
//!
//! [`ItemAuthority`] is the seam between the synchronization core and the
//! network. The production implementation is [`HttpAuthority`]; tests plug in
//! scripted fakes.

mod http;
mod types;

use std::future::Future;

use thiserror::Error;

pub use http::{build_client, HttpAuthority, RetryPolicy};
pub use types::{Item, ItemId, ListPage, ListQuery};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl RemoteError {
    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Timeout | RemoteError::Network(_) => true,
            RemoteError::HttpStatus(status) => *status >= 500 || *status == 429,
            RemoteError::ResponseTooLarge(_)
            | RemoteError::InvalidUtf8
            | RemoteError::Decode(_)
            | RemoteError::InvalidUrl
            | RemoteError::InsecureBaseUrl => false,
        }
    }
}

/// Request/response boundary to the server that owns item state.
///
/// Implementations are cheap to clone (shared connection pools behind an
/// `Arc`) because every background task takes its own handle.
pub trait ItemAuthority: Clone + Send + Sync + 'static {
    /// One page of items matching `query`.
    fn list_items(
        &self,
        query: &ListQuery,
    ) -> impl Future<Output = Result<ListPage, RemoteError>> + Send;

    /// Full item by id, or `None` when the server no longer has it.
    fn get_item(
        &self,
        id: &ItemId,
    ) -> impl Future<Output = Result<Option<Item>, RemoteError>> + Send;

    /// Sets the read flag for a batch of ids.
    fn set_read(
        &self,
        ids: &[ItemId],
        is_read: bool,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
