use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::types::{WireItem, WireListPage, WireReadUpdate};
use super::{Item, ItemAuthority, ItemId, ListPage, ListQuery, RemoteError};
use crate::util::{is_loopback_host, validate_server_url, UrlValidationError};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds the shared client: pooled connections, bounded redirects.
pub fn build_client() -> Result<reqwest::Client, RemoteError> {
    let client = reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// At most 3 hops, no loops.
fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Exponential backoff schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// 1s, 2s, 4s (max 3 retries).
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// JSON-over-HTTP item authority.
///
/// Endpoints, relative to the configured base URL:
/// - `GET items?feedId&isRead&publishedSince&limit&offset` -> `{items, totalCount}`
/// - `GET items/{id}` -> item, 404 when gone
/// - `POST items/read` with `{ids, isRead}`
#[derive(Clone)]
pub struct HttpAuthority {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("base", &self.inner.base.as_str())
            .field("token", &self.inner.token.as_ref().map(|_| "[REDACTED]"))
            .field("retry", &self.inner.retry)
            .finish()
    }
}

impl HttpAuthority {
    /// Builds an authority for `base_url`.
    ///
    /// # Errors
    ///
    /// [`RemoteError::InsecureBaseUrl`] for plain http to a non-loopback host,
    /// [`RemoteError::InvalidUrl`] for anything else that fails validation.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        token: Option<SecretString>,
    ) -> Result<Self, RemoteError> {
        let base = validate_server_url(base_url).map_err(|e| match e {
            UrlValidationError::InsecureScheme(_) => {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS server URL (HTTPS required except for localhost)");
                RemoteError::InsecureBaseUrl
            }
            other => {
                tracing::error!(base_url = %base_url, error = %other, "Rejecting server URL");
                RemoteError::InvalidUrl
            }
        })?;

        if base.scheme() == "http" {
            tracing::warn!(base_url = %base, "Using non-HTTPS server URL (localhost only)");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base,
                token,
                retry: RetryPolicy::default(),
                timeout: REQUEST_TIMEOUT,
            }),
        })
    }

    /// Replaces the retry schedule. Only valid before the authority is cloned.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry = retry;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.timeout = timeout;
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.inner.base.join(path).map_err(|_| RemoteError::InvalidUrl)
    }

    fn authorize(&self, request: reqwest::RequestBuilder, url: &Url) -> reqwest::RequestBuilder {
        let Some(token) = &self.inner.token else {
            return request;
        };
        // The base URL is validated at construction; this guards redirects
        // and joins that would leave it.
        if url.scheme() == "https" || is_loopback_host(url) {
            tracing::trace!("Server authentication configured");
            request.bearer_auth(token.expose_secret())
        } else {
            tracing::debug!(url = %url, "Skipping bearer token for insecure URL");
            request
        }
    }

    /// Runs `attempt` with exponential backoff on retryable errors.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut attempt: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RemoteError>>,
    {
        let policy = self.inner.retry;
        let mut retry_count = 0;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry_count < policy.max_retries => {
                    let delay = policy.delay_for(retry_count);
                    tracing::debug!(
                        error = %e,
                        request = what,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends `request` and returns the status plus size-limited body text.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), RemoteError> {
        let exchange = async {
            let response = request.send().await.map_err(RemoteError::Network)?;
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok((status.as_u16(), String::new()));
            }
            if !status.is_success() {
                return Err(RemoteError::HttpStatus(status.as_u16()));
            }
            let body = read_limited_text(response, MAX_RESPONSE_SIZE).await?;
            Ok((status.as_u16(), body))
        };

        tokio::time::timeout(self.inner.timeout, exchange)
            .await
            .map_err(|_| RemoteError::Timeout)?
    }

    async fn list_once(&self, query: &ListQuery) -> Result<ListPage, RemoteError> {
        let mut url = self.endpoint("items")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(feed_id) = &query.feed_id {
                pairs.append_pair("feedId", feed_id);
            }
            if let Some(is_read) = query.is_read {
                pairs.append_pair("isRead", if is_read { "true" } else { "false" });
            }
            if let Some(since) = query.published_since {
                pairs.append_pair(
                    "publishedSince",
                    &since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                );
            }
            pairs.append_pair("limit", &query.limit.to_string());
            pairs.append_pair("offset", &query.offset.to_string());
        }

        let request = self.authorize(self.inner.client.get(url.clone()), &url);
        let (status, body) = self.send(request).await?;
        if status == 404 {
            return Err(RemoteError::HttpStatus(status));
        }
        let wire: WireListPage =
            serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        wire.into_page()
    }

    async fn get_once(&self, id: &ItemId) -> Result<Option<Item>, RemoteError> {
        let mut url = self.endpoint("items/")?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl)?
            .pop_if_empty()
            .push(id.as_str());

        let request = self.authorize(self.inner.client.get(url.clone()), &url);
        let (status, body) = self.send(request).await?;
        if status == 404 {
            return Ok(None);
        }
        let wire: WireItem =
            serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        wire.into_item().map(Some)
    }

    async fn set_read_once(&self, ids: &[ItemId], is_read: bool) -> Result<(), RemoteError> {
        let url = self.endpoint("items/read")?;
        let body = WireReadUpdate { ids, is_read };
        let request = self.authorize(self.inner.client.post(url.clone()).json(&body), &url);
        let (status, _) = self.send(request).await?;
        if status == 404 {
            return Err(RemoteError::HttpStatus(status));
        }
        Ok(())
    }
}

impl ItemAuthority for HttpAuthority {
    async fn list_items(&self, query: &ListQuery) -> Result<ListPage, RemoteError> {
        let page = self.with_retry("list_items", || self.list_once(query)).await?;
        tracing::debug!(
            offset = query.offset,
            returned = page.items.len(),
            total = page.total_count,
            "Listed items"
        );
        Ok(page)
    }

    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, RemoteError> {
        self.with_retry("get_item", || self.get_once(id)).await
    }

    async fn set_read(&self, ids: &[ItemId], is_read: bool) -> Result<(), RemoteError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_retry("set_read", || self.set_read_once(ids, is_read))
            .await
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, RemoteError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(RemoteError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(RemoteError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RemoteError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| RemoteError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item_json(id: &str, is_read: bool) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "feedId": "f1",
            "title": format!("Item {id}"),
            "publishedAt": "2024-05-01T12:00:00Z",
            "receivedAt": "2024-05-01T12:01:00Z",
            "isRead": is_read,
        })
    }

    fn authority(server: &MockServer) -> HttpAuthority {
        HttpAuthority::new(reqwest::Client::new(), &server.uri(), None)
            .unwrap()
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_list_items_sends_query_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("isRead", "false"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [item_json("a", false), item_json("b", false)],
                "totalCount": "12",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ListQuery {
            feed_id: None,
            is_read: Some(false),
            published_since: None,
            limit: 2,
            offset: 4,
        };
        let page = authority(&server).list_items(&query).await.unwrap();

        assert_eq!(page.total_count, 12);
        let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_get_item_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = authority(&server).get_item(&ItemId::new("gone")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_get_item_escapes_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/a%2Fb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json("a/b", true)))
            .mount(&server)
            .await;

        let item = authority(&server)
            .get_item(&ItemId::new("a/b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.id.as_str(), "a/b");
        assert!(item.is_read);
    }

    #[tokio::test]
    async fn test_set_read_posts_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items/read"))
            .and(body_json(serde_json::json!({"ids": ["1", "2"], "isRead": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        authority(&server)
            .set_read(&[ItemId::new("1"), ItemId::new("2")], true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/x"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json("x", false)))
            .mount(&server)
            .await;

        let authority = HttpAuthority::new(reqwest::Client::new(), &server.uri(), None)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            });
        let item = authority.get_item(&ItemId::new("x")).await.unwrap();
        assert!(item.is_some());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let authority = HttpAuthority::new(reqwest::Client::new(), &server.uri(), None)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
            });
        let result = authority.set_read(&[ItemId::new("1")], false).await;
        assert!(matches!(result, Err(RemoteError::HttpStatus(400))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = authority(&server).get_item(&ItemId::new("x")).await;
        assert!(matches!(result, Err(RemoteError::Decode(_))));
    }

    #[tokio::test]
    async fn test_bearer_token_sent_to_localhost() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_json("x", false)))
            .expect(1)
            .mount(&server)
            .await;

        let authority = HttpAuthority::new(
            reqwest::Client::new(),
            &server.uri(),
            Some(SecretString::from("s3cret")),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::none());
        authority.get_item(&ItemId::new("x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_base_url_rejected() {
        let result = HttpAuthority::new(reqwest::Client::new(), "http://evil.com", None);
        assert!(matches!(result, Err(RemoteError::InsecureBaseUrl)));
    }

    #[tokio::test]
    async fn test_debug_redacts_token() {
        let authority = HttpAuthority::new(
            reqwest::Client::new(),
            "https://reader.example.com",
            Some(SecretString::from("hunter2")),
        )
        .unwrap();
        let debug = format!("{:?}", authority);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }
}
