//! Bounded, retrying page fetcher.
//!
//! A [`Fetcher`] wraps a [`Transport`] with a shared semaphore so that no
//! more than `concurrency` fetches are in flight at once. A permit is taken
//! before the first attempt and held until the fetch either succeeds or
//! gives up, so retry sleeps still count against the bound.
//!
//! Failures never escape as errors: a permanent failure (an HTTP error
//! status) is logged and yields `None` immediately, while a transient one
//! (connect, timeout, body read) is retried after a fixed delay until the
//! attempt budget runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Semaphore;

/// Total number of attempts made for a single URL by default.
pub const DEFAULT_RETRIES: u32 = 3;

/// Fixed pause between two attempts on the same URL.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors produced by a single fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a 4xx or 5xx status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// The requested URL.
        url: String,
        /// The status code returned.
        status: StatusCode,
    },

    /// The request never produced a usable response.
    #[error("Request to {url} failed: {message}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Human-readable description of the failure.
        message: String,
    },
}

impl FetchError {
    /// Returns `true` when another attempt might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The final URL after redirects.
    pub url: String,
    /// Response status.
    pub status: StatusCode,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Charset advertised in `Content-Type`, if any.
    pub encoding: Option<String>,
}

/// Pulls the `charset=` parameter out of a `Content-Type` header value.
#[must_use]
pub fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

/// Performs one HTTP GET.
///
/// Implemented for [`reqwest::Client`]; tests substitute their own.
pub trait Transport: Send + Sync {
    /// Fetches `url` once without retrying.
    fn fetch_once(&self, url: &str) -> impl Future<Output = Result<FetchResult, FetchError>> + Send;
}

impl Transport for reqwest::Client {
    async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_owned(),
            message: e.to_string(),
        };

        let response = self.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status,
            });
        }

        let final_url = response.url().to_string();
        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of);
        let body = response.bytes().await.map_err(transport)?;

        Ok(FetchResult {
            url: final_url,
            status,
            body: body.to_vec(),
            encoding,
        })
    }
}

/// Concurrency-bounded fetcher with fixed-delay retries.
#[derive(Debug)]
pub struct Fetcher<T> {
    transport: T,
    gate: Arc<Semaphore>,
    retries: u32,
    retry_delay: Duration,
}

impl<T: Transport> Fetcher<T> {
    /// Creates a fetcher allowing at most `concurrency` fetches at once.
    ///
    /// A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(transport: T, concurrency: usize) -> Self {
        Self {
            transport,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the total number of attempts per URL (at least one).
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Total attempts made per URL.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Fetches `url`, returning `None` once every attempt has failed or the
    /// server answered with an error status.
    pub async fn fetch(&self, url: &str) -> Option<FetchResult> {
        let Ok(_permit) = self.gate.acquire().await else {
            log::error!("Fetch gate closed before {url} could be requested");
            return None;
        };

        for attempt in 1..=self.retries {
            match self.transport.fetch_once(url).await {
                Ok(result) => return Some(result),
                Err(e) if e.is_transient() => {
                    if attempt < self.retries {
                        log::warn!(
                            "{e} (attempt {attempt}/{}), retrying in {:?}",
                            self.retries,
                            self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        log::warn!("{e} (attempt {attempt}/{}), giving up", self.retries);
                    }
                }
                Err(e) => {
                    log::error!("{e}");
                    return None;
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Transport that always fails with a transient error.
    #[derive(Default)]
    struct Unreachable {
        calls: AtomicUsize,
    }

    impl Transport for Unreachable {
        async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Transport {
                url: url.to_owned(),
                message: "connection refused".to_owned(),
            })
        }
    }

    /// Transport that records how many calls overlap.
    #[derive(Default)]
    struct Tracking {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl Transport for Tracking {
        async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(url.to_owned());
            Ok(FetchResult {
                url: url.to_owned(),
                status: StatusCode::OK,
                body: b"ok".to_vec(),
                encoding: None,
            })
        }
    }

    #[test]
    fn charset_is_read_from_content_type() {
        assert_eq!(
            charset_of("text/html; charset=UTF-8").as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            charset_of("text/html;charset=\"windows-1258\"").as_deref(),
            Some("windows-1258")
        );
        assert_eq!(charset_of("text/html"), None);
    }

    #[tokio::test]
    async fn transient_failures_use_every_attempt() {
        let fetcher = Fetcher::new(Unreachable::default(), 2)
            .with_retries(3)
            .with_retry_delay(Duration::from_millis(1));

        assert!(fetcher.fetch("http://unreachable.invalid/").await.is_none());
        assert_eq!(fetcher.transport().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_still_attempts_once() {
        let fetcher = Fetcher::new(Unreachable::default(), 1)
            .with_retries(0)
            .with_retry_delay(Duration::from_millis(1));

        assert!(fetcher.fetch("http://unreachable.invalid/").await.is_none());
        assert_eq!(fetcher.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn in_flight_fetches_never_exceed_the_bound() {
        let fetcher = Fetcher::new(Tracking::default(), 3);
        let urls: Vec<String> = (0..12).map(|i| format!("http://shop.test/{i}")).collect();

        let results =
            futures::future::join_all(urls.iter().map(|url| fetcher.fetch(url))).await;

        assert!(results.iter().all(Option::is_some));
        let peak = fetcher.transport().peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 1);
        assert_eq!(fetcher.transport().seen.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn success_returns_the_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dtdd/phone-a")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><body>hi</body></html>")
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(reqwest::Client::new(), 1);
        let result = fetcher
            .fetch(&format!("{}/dtdd/phone-a", server.url()))
            .await
            .unwrap();

        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.encoding.as_deref(), Some("utf-8"));
        assert_eq!(result.body, b"<html><body>hi</body></html>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let not_found = server
            .mock("GET", "/gone")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/broken")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(reqwest::Client::new(), 2)
            .with_retry_delay(Duration::from_millis(1));

        assert!(fetcher.fetch(&format!("{}/gone", server.url())).await.is_none());
        assert!(fetcher.fetch(&format!("{}/broken", server.url())).await.is_none());
        not_found.assert_async().await;
        broken.assert_async().await;
    }
}
