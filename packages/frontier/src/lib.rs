#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Product link discovery.
//!
//! A [`Frontier`] starts from one seed URL and repeatedly inspects queued
//! pages, following every link matched by the retailer's link query. Pages
//! that were fetched and yielded at least one link form the crawl result,
//! which is appended to `<retailer>_urls.csv` as it grows.
//!
//! When that file already exists its URLs are loaded as history: they are
//! re-crawled so new links can still be found beneath them, but no second
//! row is written for them.

pub mod links;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use retail_crawl_scraper::{
    BatchProgress, ClientError, Fetcher, PathQuery, RunOptions, Transport, extract,
};
use retail_crawl_sink::{ResultSink, paths, read_column};
use retail_crawl_storage::{ObjectStore, StorageError, UploadOutcome, UploadTarget};
use tokio::sync::Mutex;

/// Header of the crawl output file.
pub const OUTPUT_HEADER: &[&str] = &["url", "created_at"];

/// Errors raised while setting up or running a crawl.
#[derive(Debug, thiserror::Error)]
pub enum FrontierError {
    /// The seed URL has no usable host.
    #[error("Invalid seed URL '{url}'")]
    InvalidSeed {
        /// The rejected seed.
        url: String,
    },

    /// Upload was requested but there is no output file to upload.
    #[error("Cannot locate output file for uploading since no output directory is set")]
    UploadWithoutOutput,

    /// The upload target is unusable.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Copy of the frontier's sets at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierSnapshot {
    /// URLs waiting to be inspected.
    pub queue: BTreeSet<String>,
    /// Every URL seen, discovered or inspected.
    pub crawled: BTreeSet<String>,
    /// URLs that were fetched and yielded links.
    pub result: BTreeSet<String>,
    /// URLs loaded from a previous run's output.
    pub history: BTreeSet<String>,
}

/// Summary of a finished crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    /// Size of the result set.
    pub total: usize,
    /// Result URLs not present in history.
    pub new_urls: usize,
    /// The output file, if one is written.
    pub output: Option<PathBuf>,
}

impl CrawlReport {
    /// Whether the crawl found URLs that earlier runs had not recorded, and
    /// so whether a follow-up scrape has anything new to read.
    #[must_use]
    pub const fn has_new_urls(&self) -> bool {
        self.new_urls > 0
    }
}

/// What the post-crawl upload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// The store accepted (or already had) the file.
    Uploaded(UploadOutcome),
    /// Nothing was found beyond history, so nothing was sent.
    NothingNew,
    /// The store returned an error; it has been logged.
    Failed,
    /// No upload target is configured.
    Disabled,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: BTreeSet<String>,
    crawled: BTreeSet<String>,
    result: BTreeSet<String>,
    history: BTreeSet<String>,
    sink: ResultSink,
}

impl FrontierState {
    fn snapshot(&self) -> FrontierSnapshot {
        FrontierSnapshot {
            queue: self.queue.clone(),
            crawled: self.crawled.clone(),
            result: self.result.clone(),
            history: self.history.clone(),
        }
    }

    fn new_urls(&self) -> usize {
        self.result.difference(&self.history).count()
    }
}

/// One crawl job.
#[derive(Debug)]
pub struct Frontier {
    seed: String,
    slug: String,
    link_query: PathQuery,
    narrowing: Vec<Regex>,
    output: Option<PathBuf>,
    upload: Option<UploadTarget>,
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates a crawl job starting at `seed`.
    ///
    /// With an `output_dir`, results go to `<output_dir>/<slug>_urls.csv`
    /// and an existing file there is loaded as history.
    ///
    /// # Errors
    ///
    /// * [`FrontierError::InvalidSeed`] if `seed` has no usable host.
    /// * [`FrontierError::UploadWithoutOutput`] if `upload` is set without
    ///   `output_dir`.
    /// * [`FrontierError::Storage`] if `upload` does not validate.
    pub fn new(
        seed: &str,
        link_query: PathQuery,
        narrowing: Vec<Regex>,
        output_dir: Option<&Path>,
        upload: Option<UploadTarget>,
    ) -> Result<Self, FrontierError> {
        let slug = paths::retailer_slug(seed).ok_or_else(|| FrontierError::InvalidSeed {
            url: seed.to_owned(),
        })?;

        if let Some(target) = &upload {
            if output_dir.is_none() {
                return Err(FrontierError::UploadWithoutOutput);
            }
            target.validate()?;
        }

        let output = output_dir.map(|dir| paths::output_path(dir, &paths::frontier_file_name(&slug)));

        let mut state = FrontierState::default();
        state.queue.insert(seed.to_owned());
        if let Some(path) = &output {
            history_check(&mut state, path);
        }

        Ok(Self {
            seed: seed.to_owned(),
            slug,
            link_query,
            narrowing,
            output,
            upload,
            state: Mutex::new(state),
        })
    }

    /// URL the crawl starts from.
    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Retailer slug derived from the seed host.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Path of `<slug>_urls.csv`, when an output directory is set.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    #[must_use]
    pub const fn upload_target(&self) -> Option<&UploadTarget> {
        self.upload.as_ref()
    }

    /// Copies the current queue, crawled, result and history sets.
    pub async fn snapshot(&self) -> FrontierSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Clears every set and forgets which files were started.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.crawled.clear();
        state.result.clear();
        state.history.clear();
        state.sink.reset();
        log::info!("Crawler for {} reset.", self.slug.to_uppercase());
    }

    /// Crawls until the queue is empty using a reqwest client built from
    /// `options`.
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::Client`] if the HTTP client cannot be built.
    /// Per-URL failures are logged, never returned.
    pub async fn run(&self, options: &RunOptions) -> Result<CrawlReport, FrontierError> {
        let fetcher = options.fetcher()?;
        Ok(self.run_with(&fetcher, options).await)
    }

    /// Crawls until the queue is empty using `fetcher`.
    pub async fn run_with<T: Transport>(
        &self,
        fetcher: &Fetcher<T>,
        options: &RunOptions,
    ) -> CrawlReport {
        let label = self.slug.to_uppercase();
        let batch_size = options.effective_batch_size();
        log::info!("Start crawling {label} from {}", self.seed);

        loop {
            let batch: Vec<String> = {
                let state = self.state.lock().await;
                state.queue.iter().take(batch_size).cloned().collect()
            };
            if batch.is_empty() {
                break;
            }

            futures::future::join_all(batch.iter().map(|url| self.inspect(fetcher, url))).await;

            options.progress.on_batch(&self.progress(&label).await);

            if let Some(delay) = options.inter_batch_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let state = self.state.lock().await;
        let new_urls = state.new_urls();
        if new_urls > 0 {
            log::info!("Found {new_urls} more urls");
        } else {
            log::info!("No more urls found");
        }
        let report = CrawlReport {
            total: state.result.len(),
            new_urls,
            output: self.output.clone(),
        };
        drop(state);

        options.progress.on_finish(&self.progress(&label).await);
        report
    }

    async fn progress(&self, label: &str) -> BatchProgress {
        let state = self.state.lock().await;
        BatchProgress {
            label: label.to_owned(),
            pending: state.queue.len(),
            processed: state.crawled.len(),
            valid: state.result.len(),
        }
    }

    /// Fetches `url`, evaluates the link query and merges the outcome.
    ///
    /// Returns `true` if the page yielded at least one link.
    pub async fn inspect<T: Transport>(&self, fetcher: &Fetcher<T>, url: &str) -> bool {
        let discovered = match fetcher.fetch(url).await {
            Some(page) => {
                let hrefs = extract(
                    &page.body,
                    Some(&self.link_query),
                    page.encoding.as_deref(),
                    &self.narrowing,
                )
                .into_matches();
                links::resolve_links(&page.url, &hrefs)
            }
            None => Vec::new(),
        };

        let found = !discovered.is_empty();
        self.merge(url, &discovered).await;
        found
    }

    /// Folds one completed inspection into the frontier.
    ///
    /// `url` leaves the queue and is never queued again. Each discovered
    /// link not seen before is queued. If `discovered` is non-empty and
    /// `url` is not in history, `url` joins the result, and the first time
    /// it does a row is appended to the output file.
    ///
    /// Returns `true` if a row was written.
    pub async fn merge(&self, url: &str, discovered: &[String]) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        state.queue.remove(url);
        state.crawled.insert(url.to_owned());
        if discovered.is_empty() {
            return false;
        }

        for link in discovered {
            if !state.crawled.contains(link) {
                state.queue.insert(link.clone());
            }
        }

        let mut recorded = false;
        if !state.history.contains(url) && state.result.insert(url.to_owned()) {
            if let Some(path) = &self.output {
                let created_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
                recorded = state
                    .sink
                    .append_row(path, OUTPUT_HEADER, &[url, created_at.as_str()]);
            }
        }

        state.crawled.extend(discovered.iter().cloned());
        recorded
    }

    /// Uploads the output file when the crawl found URLs beyond history.
    pub async fn upload<S: ObjectStore>(&self, store: &S) -> UploadStatus {
        let (Some(target), Some(path)) = (&self.upload, &self.output) else {
            return UploadStatus::Disabled;
        };

        if self.state.lock().await.new_urls() == 0 {
            log::info!("Uploading cancelled since no more urls found");
            return UploadStatus::NothingNew;
        }

        let file_name = paths::frontier_file_name(&self.slug);
        let key = target.key_for(&file_name);
        log::info!("Start uploading {file_name} to {}...", store.bucket());
        match store.put_file(&key, path).await {
            Ok(outcome) => {
                log::info!("Uploading {file_name} successfully.");
                UploadStatus::Uploaded(outcome)
            }
            Err(e) => {
                log::error!("Uploading {file_name} failed: {e}");
                UploadStatus::Failed
            }
        }
    }
}

/// Loads a previous run's URLs into history, result, queue and crawled, and
/// adopts the file so new rows are appended after the old ones.
fn history_check(state: &mut FrontierState, path: &Path) {
    if !path.exists() {
        return;
    }

    match read_column(path, "url") {
        Ok(urls) => {
            log::info!("Resuming from {} ({} urls)", path.display(), urls.len());
            for url in urls {
                state.history.insert(url.clone());
                state.result.insert(url.clone());
                state.queue.insert(url.clone());
                state.crawled.insert(url);
            }
        }
        Err(e) => log::warn!("Ignoring unreadable history: {e}"),
    }
    state.sink.adopt(path);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use reqwest::StatusCode;
    use retail_crawl_scraper::progress::null_progress;
    use retail_crawl_scraper::{FetchError, FetchResult};

    use super::*;

    const SEED: &str = "https://www.shop.com/";

    fn query() -> PathQuery {
        PathQuery::parse("a @href").unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    fn data_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_owned)
            .collect()
    }

    /// Serves fixed bodies by URL and 404s everything else.
    struct SiteMap {
        pages: BTreeMap<&'static str, &'static str>,
    }

    impl Transport for SiteMap {
        async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
            let body = self.pages.get(url).ok_or_else(|| FetchError::Status {
                url: url.to_owned(),
                status: StatusCode::NOT_FOUND,
            })?;
            Ok(FetchResult {
                url: url.to_owned(),
                status: StatusCode::OK,
                body: body.as_bytes().to_vec(),
                encoding: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        keys: StdMutex<Vec<String>>,
    }

    impl ObjectStore for FakeStore {
        fn bucket(&self) -> &str {
            "crawling-to-dwh"
        }

        async fn put_file(&self, key: &str, _local: &Path) -> Result<UploadOutcome, StorageError> {
            self.keys.lock().unwrap().push(key.to_owned());
            Ok(UploadOutcome::Uploaded)
        }
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let frontier = Frontier::new(SEED, query(), vec![], Some(dir.path()), None).unwrap();
        let links = strings(&["https://www.shop.com/laptop/a.html"]);

        assert!(frontier.merge(SEED, &links).await);
        let first = frontier.snapshot().await;
        assert!(!frontier.merge(SEED, &links).await);

        assert_eq!(frontier.snapshot().await, first);
        let rows = data_rows(frontier.output().unwrap());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("https://www.shop.com/,"));
    }

    #[tokio::test]
    async fn inspected_url_is_never_requeued() {
        let frontier = Frontier::new(SEED, query(), vec![], None, None).unwrap();
        let a = "https://www.shop.com/laptop/a.html";

        frontier.merge(SEED, &strings(&[SEED, a])).await;
        let state = frontier.snapshot().await;
        assert!(!state.queue.contains(SEED));
        assert!(state.queue.contains(a));

        frontier.merge(a, &strings(&[SEED, a])).await;
        let state = frontier.snapshot().await;
        assert!(state.queue.is_empty());
        assert_eq!(state.result, BTreeSet::from([SEED.to_owned(), a.to_owned()]));
    }

    #[tokio::test]
    async fn failed_inspection_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let frontier = Frontier::new(SEED, query(), vec![], Some(dir.path()), None).unwrap();

        assert!(!frontier.merge(SEED, &[]).await);

        let state = frontier.snapshot().await;
        assert!(state.queue.is_empty());
        assert!(state.result.is_empty());
        assert!(!frontier.output().unwrap().exists());
    }

    #[tokio::test]
    async fn history_suppresses_second_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop_urls.csv");
        std::fs::write(&path, format!("url,created_at\n{SEED},2024-01-01 00:00:00\n")).unwrap();

        let frontier = Frontier::new(SEED, query(), vec![], Some(dir.path()), None).unwrap();
        let state = frontier.snapshot().await;
        assert!(state.history.contains(SEED));
        assert!(state.queue.contains(SEED));
        assert!(state.result.contains(SEED));

        let a = "https://www.shop.com/dtdd/b.html";
        assert!(!frontier.merge(SEED, &strings(&[a])).await);
        assert!(frontier.merge(a, &strings(&[SEED])).await);

        let rows = data_rows(&path);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with(SEED));
        assert!(rows[1].starts_with(a));
    }

    #[tokio::test]
    async fn upload_requires_output_and_valid_target() {
        assert!(matches!(
            Frontier::new(SEED, query(), vec![], None, Some(UploadTarget::new("b", "crawled/"))),
            Err(FrontierError::UploadWithoutOutput)
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Frontier::new(SEED, query(), vec![], Some(dir.path()), Some(UploadTarget::new("", ""))),
            Err(FrontierError::Storage(_))
        ));

        assert!(matches!(
            Frontier::new("nonsense", query(), vec![], None, None),
            Err(FrontierError::InvalidSeed { .. })
        ));
    }

    #[tokio::test]
    async fn upload_is_gated_on_new_urls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("shop_urls.csv"),
            format!("url,created_at\n{SEED},2024-01-01 00:00:00\n"),
        )
        .unwrap();
        let target = UploadTarget::new("crawling-to-dwh", "crawled/");
        let frontier = Frontier::new(SEED, query(), vec![], Some(dir.path()), Some(target)).unwrap();
        let store = FakeStore::default();

        frontier.merge(SEED, &strings(&["https://www.shop.com/dtdd/b.html"])).await;
        assert_eq!(frontier.upload(&store).await, UploadStatus::NothingNew);
        assert!(store.keys.lock().unwrap().is_empty());

        frontier
            .merge("https://www.shop.com/dtdd/b.html", &strings(&[SEED]))
            .await;
        assert_eq!(
            frontier.upload(&store).await,
            UploadStatus::Uploaded(UploadOutcome::Uploaded)
        );
        assert_eq!(*store.keys.lock().unwrap(), vec!["crawled/shop_urls.csv".to_owned()]);
    }

    #[tokio::test]
    async fn upload_disabled_without_target() {
        let frontier = Frontier::new(SEED, query(), vec![], None, None).unwrap();
        assert_eq!(
            frontier.upload(&FakeStore::default()).await,
            UploadStatus::Disabled
        );
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let frontier = Frontier::new(SEED, query(), vec![], None, None).unwrap();
        frontier.merge(SEED, &strings(&["https://www.shop.com/a"])).await;
        frontier.reset().await;
        assert_eq!(frontier.snapshot().await, FrontierSnapshot::default());
    }

    #[tokio::test]
    async fn seed_inspection_discovers_links() {
        let mut server = mockito::Server::new_async().await;
        let home = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(
                r#"<html><body>
                <a href="/laptop/a.html">A</a>
                <a href="/laptop/a.html">A again</a>
                <a href="/dtdd/b.html">B</a>
                </body></html>"#,
            )
            .expect(1)
            .create_async()
            .await;

        let seed = format!("{}/", server.url());
        let frontier = Frontier::new(&seed, query(), vec![], None, None).unwrap();
        let fetcher = RunOptions::default().fetcher().unwrap();

        assert!(frontier.inspect(&fetcher, &seed).await);

        let a = format!("{}/laptop/a.html", server.url());
        let b = format!("{}/dtdd/b.html", server.url());
        let state = frontier.snapshot().await;
        assert_eq!(state.queue, BTreeSet::from([a.clone(), b.clone()]));
        assert_eq!(state.crawled, BTreeSet::from([seed.clone(), a, b]));
        assert_eq!(state.result, BTreeSet::from([seed]));
        home.assert_async().await;
    }

    #[tokio::test]
    async fn run_drains_the_queue() {
        let mut server = mockito::Server::new_async().await;
        let home = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<a href="/laptop/a.html">A</a><a href="/dtdd/b.html">B</a>"#)
            .expect(1)
            .create_async()
            .await;
        let a = server
            .mock("GET", "/laptop/a.html")
            .with_status(200)
            .with_body("<p>no links here</p>")
            .expect(1)
            .create_async()
            .await;
        let b = server
            .mock("GET", "/dtdd/b.html")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let seed = format!("{}/", server.url());
        let frontier = Frontier::new(&seed, query(), vec![], Some(dir.path()), None).unwrap();
        let options = RunOptions::default()
            .with_batch_size(1)
            .with_progress(null_progress());

        let report = frontier.run(&options).await.unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(report.new_urls, 1);
        let state = frontier.snapshot().await;
        assert!(state.queue.is_empty());
        assert_eq!(state.result, BTreeSet::from([seed.clone()]));

        let rows = data_rows(report.output.as_deref().unwrap());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with(&seed));

        home.assert_async().await;
        a.assert_async().await;
        b.assert_async().await;
    }

    #[tokio::test]
    async fn latin1_pages_still_yield_links() {
        let mut server = mockito::Server::new_async().await;
        let mut body = b"<p>Caf\xe9</p>".to_vec();
        body.extend_from_slice(br#"<a href="/laptop/a.html">A</a><a href="/dtdd/b.html">B</a>"#);
        let home = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=ISO-8859-1")
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let seed = format!("{}/", server.url());
        let frontier = Frontier::new(&seed, query(), vec![], None, None).unwrap();
        let fetcher = RunOptions::default().fetcher().unwrap();

        assert!(frontier.inspect(&fetcher, &seed).await);

        let state = frontier.snapshot().await;
        assert_eq!(
            state.queue,
            BTreeSet::from([
                format!("{}/dtdd/b.html", server.url()),
                format!("{}/laptop/a.html", server.url()),
            ])
        );
        assert_eq!(state.result, BTreeSet::from([seed]));
        home.assert_async().await;
    }

    #[test]
    fn report_wants_a_scrape_only_for_new_urls() {
        let mut report = CrawlReport {
            total: 3,
            new_urls: 0,
            output: None,
        };
        assert!(!report.has_new_urls());

        report.new_urls = 1;
        assert!(report.has_new_urls());
    }

    #[tokio::test(start_paused = true)]
    async fn run_pauses_between_batches() {
        let site = SiteMap {
            pages: BTreeMap::from([
                (
                    SEED,
                    r#"<a href="/laptop/a.html">A</a><a href="/dtdd/b.html">B</a>"#,
                ),
                ("https://www.shop.com/laptop/a.html", "<p>no links</p>"),
                ("https://www.shop.com/dtdd/b.html", "<p>no links</p>"),
            ]),
        };
        let fetcher = Fetcher::new(site, 4);
        let delay = Duration::from_secs(5);
        let options = RunOptions::default()
            .with_batch_size(1)
            .with_inter_batch_delay(Some(delay))
            .with_progress(null_progress());
        let frontier = Frontier::new(SEED, query(), vec![], None, None).unwrap();

        let start = tokio::time::Instant::now();
        let report = frontier.run_with(&fetcher, &options).await;

        assert!(start.elapsed() >= delay * 3);
        assert_eq!(report.total, 1);
        assert!(report.has_new_urls());
        assert!(frontier.snapshot().await.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_without_delay_does_not_sleep() {
        let site = SiteMap {
            pages: BTreeMap::from([(SEED, "<p>no links</p>")]),
        };
        let options = RunOptions::default().with_progress(null_progress());
        let frontier = Frontier::new(SEED, query(), vec![], None, None).unwrap();

        let start = tokio::time::Instant::now();
        let report = frontier.run_with(&Fetcher::new(site, 4), &options).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!report.has_new_urls());
    }
}
