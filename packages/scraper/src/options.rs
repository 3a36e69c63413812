//! Runtime parameters shared by crawl and scrape runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::fetch::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, Fetcher, Transport};
use crate::progress::{ProgressObserver, log_progress};

/// Headers sent with every request unless overridden.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64; rv:141.0) Gecko/20100101 Firefox/141.0",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "vi,en-US;q=0.9,en;q=0.8,en-GB;q=0.8"),
    ("Cache-Control", "no-cache"),
    ("Referer", "https://www.google.com/"),
    ("DNT", "1"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "cross-site"),
    ("Sec-Fetch-User", "?1"),
    ("Pragma", "no-cache"),
];

/// Errors raised while building the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A configured header name or value is not valid HTTP.
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// Why it was rejected.
        message: String,
    },

    /// reqwest refused the client configuration.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Parameters for one crawl or scrape run.
#[derive(Clone)]
pub struct RunOptions {
    /// Hard per-request timeout.
    pub timeout: Duration,
    /// Maximum number of in-flight fetches.
    pub concurrency: usize,
    /// Number of URLs taken from the pending set per batch.
    pub batch_size: usize,
    /// Extra headers, overriding [`DEFAULT_HEADERS`] by name.
    pub headers: BTreeMap<String, String>,
    /// Optional pause after each batch.
    pub inter_batch_delay: Option<Duration>,
    /// Total attempts per URL.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Whether HTTP redirects are followed.
    pub follow_redirects: bool,
    /// Receives per-batch counters.
    pub progress: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .field("batch_size", &self.batch_size)
            .field("headers", &self.headers)
            .field("inter_batch_delay", &self.inter_batch_delay)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("follow_redirects", &self.follow_redirects)
            .finish_non_exhaustive()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            concurrency: 5,
            batch_size: 20,
            headers: BTreeMap::new(),
            inter_batch_delay: None,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            follow_redirects: true,
            progress: log_progress(),
        }
    }
}

impl RunOptions {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_owned(), value.to_owned());
        self
    }

    #[must_use]
    pub const fn with_inter_batch_delay(mut self, delay: Option<Duration>) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub const fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Batch size clamped to at least one URL.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Default headers with [`Self::headers`] applied on top.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] if a name or value is not
    /// valid HTTP.
    pub fn header_map(&self) -> Result<HeaderMap, ClientError> {
        let mut merged: BTreeMap<String, String> = DEFAULT_HEADERS
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_owned()))
            .collect();
        for (k, v) in &self.headers {
            merged.insert(k.to_ascii_lowercase(), v.clone());
        }

        let mut map = HeaderMap::new();
        for (k, v) in &merged {
            let invalid = |message: String| ClientError::InvalidHeader {
                name: k.clone(),
                message,
            };
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(v).map_err(|e| invalid(e.to_string()))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Builds the HTTP client for one run.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if a header is invalid or reqwest rejects the
    /// configuration.
    pub fn build_client(&self) -> Result<reqwest::Client, ClientError> {
        let redirects = if self.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };

        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.header_map()?)
            .redirect(redirects)
            .build()?)
    }

    /// Wraps `transport` in a [`Fetcher`] configured from these options.
    #[must_use]
    pub fn fetcher_with<T: Transport>(&self, transport: T) -> Fetcher<T> {
        Fetcher::new(transport, self.concurrency)
            .with_retries(self.retries)
            .with_retry_delay(self.retry_delay)
    }

    /// Builds a reqwest-backed [`Fetcher`] for one run.
    ///
    /// # Errors
    ///
    /// See [`Self::build_client`].
    pub fn fetcher(&self) -> Result<Fetcher<reqwest::Client>, ClientError> {
        Ok(self.fetcher_with(self.build_client()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_headers_override_defaults() {
        let options = RunOptions::default()
            .with_header("User-Agent", "retail-crawl-test")
            .with_header("X-Extra", "1");
        let map = options.header_map().unwrap();

        assert_eq!(map["user-agent"], "retail-crawl-test");
        assert_eq!(map["x-extra"], "1");
        assert_eq!(map["accept-language"], "vi,en-US;q=0.9,en;q=0.8,en-GB;q=0.8");
        assert_eq!(map.len(), DEFAULT_HEADERS.len() + 1);
    }

    #[test]
    fn invalid_header_is_reported() {
        let options = RunOptions::default().with_header("Bad Header", "x");
        let err = options.header_map().unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader { ref name, .. } if name == "bad header"));
    }

    #[test]
    fn batch_size_never_collapses_to_zero() {
        assert_eq!(RunOptions::default().with_batch_size(0).effective_batch_size(), 1);
        assert_eq!(RunOptions::default().effective_batch_size(), 20);
    }

    #[tokio::test]
    async fn built_client_sends_default_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("accept-language", "vi,en-US;q=0.9,en;q=0.8,en-GB;q=0.8")
            .match_header("referer", "https://www.google.com/")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let fetcher = RunOptions::default().fetcher().unwrap();
        let page = fetcher.fetch(&format!("{}/", server.url())).await;

        assert!(page.is_some());
        mock.assert_async().await;
    }
}
