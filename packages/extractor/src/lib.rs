#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Product detail page extraction.
//!
//! An [`Extractor`] takes the URLs a crawl produced, fetches each detail
//! page, reads the JSON metadata block and the spec list, classifies the
//! product and resolves the spec columns of its device kind. Every record
//! is appended to `<retailer>_<plural>_<YYYY-MM-DD>.csv` as soon as it is
//! built.

pub mod classify;
pub mod common;
pub mod fragments;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use retail_crawl_product_models::{DeviceKind, ProductRecord};
use retail_crawl_scraper::{
    BatchProgress, ClientError, FetchResult, Fetcher, PathQuery, RunOptions, Transport,
    extract,
};
use retail_crawl_sink::{ResultSink, paths};
use retail_crawl_storage::{
    ObjectStore, StorageError, UploadJob, UploadStats, UploadTarget, upload_all,
};
use serde_json::Value;
use tokio::sync::Mutex;

/// Errors raised while setting up a scrape or reading one page.
#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    /// There is nothing to scrape.
    #[error("No urls to scrape")]
    NoUrls,

    /// A URL has no usable host to name the output after.
    #[error("Invalid product URL '{url}'")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// Upload was requested but there are no output files to upload.
    #[error("Cannot locate output files for uploading since no output directory is set")]
    UploadWithoutOutput,

    /// The upload target is unusable.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The page carried no JSON metadata block.
    #[error("No product metadata on the page")]
    MissingMetadata,

    /// The metadata block is not valid JSON.
    #[error("Malformed product metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// A field every record needs is absent.
    #[error("Product metadata has no '{field}'")]
    MissingField {
        /// JSON key that was looked up.
        field: &'static str,
    },

    /// The URL's first path segment is not a device segment.
    #[error("Unknown product category '{segment}'")]
    UnknownCategory {
        /// The unrecognized segment.
        segment: String,
    },
}

/// Copy of the extractor's progress at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractorSnapshot {
    /// URLs not yet processed.
    pub pending: BTreeSet<String>,
    /// URLs processed, with or without a record.
    pub scraped: BTreeSet<String>,
    /// Number of records built.
    pub valid: usize,
}

/// Summary of a finished scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    /// URLs processed, whether or not they produced a record.
    pub scraped: usize,
    /// Records built and written.
    pub valid: usize,
    /// Output files written this run.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct ExtractorState {
    pending: BTreeSet<String>,
    scraped: BTreeSet<String>,
    records: Vec<ProductRecord>,
    sink: ResultSink,
    written: BTreeMap<PathBuf, (DeviceKind, String)>,
}

/// One scrape job.
#[derive(Debug)]
pub struct Extractor {
    retailer: String,
    detail_query: PathQuery,
    narrowing: Vec<Regex>,
    output_dir: Option<PathBuf>,
    upload: Option<UploadTarget>,
    state: Mutex<ExtractorState>,
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Category segment of a product page URL.
///
/// Only `/<category>/<slug>` paths with a known category and a non-empty
/// slug qualify; bare category listings such as `/laptop`, `/laptop/` or
/// `/laptop?g=asus` yield `None`.
fn product_segment(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    let mut segments = url.path_segments()?;
    let category = segments.next()?;
    DeviceKind::from_path_segment(category)?;
    segments
        .next()
        .is_some_and(|slug| !slug.is_empty())
        .then(|| category.to_owned())
}

impl Extractor {
    /// Creates a scrape job over `urls`.
    ///
    /// The retailer name used in output file names comes from the first
    /// URL's host.
    ///
    /// # Errors
    ///
    /// * [`ExtractorError::NoUrls`] if `urls` is empty.
    /// * [`ExtractorError::InvalidUrl`] if the first URL has no usable host.
    /// * [`ExtractorError::UploadWithoutOutput`] if `upload` is set without
    ///   `output_dir`.
    /// * [`ExtractorError::Storage`] if `upload` does not validate.
    pub fn new<I, S>(
        urls: I,
        detail_query: PathQuery,
        narrowing: Vec<Regex>,
        output_dir: Option<&Path>,
        upload: Option<UploadTarget>,
    ) -> Result<Self, ExtractorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let first = urls.first().ok_or(ExtractorError::NoUrls)?;
        let retailer = paths::retailer_slug(first).ok_or_else(|| ExtractorError::InvalidUrl {
            url: first.clone(),
        })?;

        if let Some(target) = &upload {
            if output_dir.is_none() {
                return Err(ExtractorError::UploadWithoutOutput);
            }
            target.validate()?;
        }

        let state = ExtractorState {
            pending: urls.into_iter().collect(),
            ..ExtractorState::default()
        };

        Ok(Self {
            retailer,
            detail_query,
            narrowing,
            output_dir: output_dir.map(Path::to_path_buf),
            upload,
            state: Mutex::new(state),
        })
    }

    /// Retailer slug used in output file names.
    #[must_use]
    pub fn retailer(&self) -> &str {
        &self.retailer
    }

    /// Directory the per-kind CSV files go to, if any.
    #[must_use]
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    #[must_use]
    pub const fn upload_target(&self) -> Option<&UploadTarget> {
        self.upload.as_ref()
    }

    /// Copies the pending and scraped sets and the record count.
    pub async fn snapshot(&self) -> ExtractorSnapshot {
        let state = self.state.lock().await;
        ExtractorSnapshot {
            pending: state.pending.clone(),
            scraped: state.scraped.clone(),
            valid: state.records.len(),
        }
    }

    /// Records built so far, in completion order.
    pub async fn records(&self) -> Vec<ProductRecord> {
        self.state.lock().await.records.clone()
    }

    /// Clears every set and record and forgets which files were started.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.scraped.clear();
        state.records.clear();
        state.written.clear();
        state.sink.reset();
        log::info!("Scraper for {} reset.", self.retailer.to_uppercase());
    }

    /// Scrapes every pending URL using a reqwest client built from
    /// `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractorError::Client`] if the HTTP client cannot be
    /// built. Per-URL failures are logged, never returned.
    pub async fn execute(&self, options: &RunOptions) -> Result<ScrapeReport, ExtractorError> {
        let fetcher = options.fetcher()?;
        Ok(self.execute_with(&fetcher, options).await)
    }

    /// Scrapes every pending URL using `fetcher`.
    pub async fn execute_with<T: Transport>(
        &self,
        fetcher: &Fetcher<T>,
        options: &RunOptions,
    ) -> ScrapeReport {
        let label = self.retailer.to_uppercase();
        let batch_size = options.effective_batch_size();
        log::info!("Start scraping {label}");

        loop {
            let batch: Vec<String> = {
                let state = self.state.lock().await;
                state.pending.iter().take(batch_size).cloned().collect()
            };
            if batch.is_empty() {
                break;
            }

            futures::future::join_all(batch.iter().map(|url| self.scrape(fetcher, url))).await;

            options.progress.on_batch(&self.progress(&label).await);

            if let Some(delay) = options.inter_batch_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let state = self.state.lock().await;
        let report = ScrapeReport {
            scraped: state.scraped.len(),
            valid: state.records.len(),
            files: state.written.keys().cloned().collect(),
        };
        drop(state);

        log::info!("Scraping successfully.");
        log::info!(
            "From: {label} | Scraped: {} | Valid: {}",
            report.scraped,
            report.valid
        );
        options.progress.on_finish(&self.progress(&label).await);
        report
    }

    async fn progress(&self, label: &str) -> BatchProgress {
        let state = self.state.lock().await;
        BatchProgress {
            label: label.to_owned(),
            pending: state.pending.len(),
            processed: state.scraped.len(),
            valid: state.records.len(),
        }
    }

    /// Scrapes one URL and records the outcome.
    ///
    /// URLs outside the known device segments are marked scraped without
    /// being fetched. Returns `true` if a record was built.
    pub async fn scrape<T: Transport>(&self, fetcher: &Fetcher<T>, url: &str) -> bool {
        let record = match product_segment(url) {
            Some(segment) => self.fetch_record(fetcher, url, &segment).await,
            None => {
                log::debug!("Skipping {url}: not a product page");
                None
            }
        };
        self.commit(url, record).await
    }

    async fn fetch_record<T: Transport>(
        &self,
        fetcher: &Fetcher<T>,
        url: &str,
        segment: &str,
    ) -> Option<ProductRecord> {
        let parsed = match fetcher.fetch(url).await {
            Some(page) => self.parse_page(&page, segment).map_err(Some),
            None => Err(None),
        };

        match parsed {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("{url} might be removed from the website. Check again.");
                if let Some(e) = e {
                    log::debug!("{url}: {e}");
                }
                None
            }
        }
    }

    fn parse_page(&self, page: &FetchResult, segment: &str) -> Result<ProductRecord, ExtractorError> {
        let texts = extract(
            &page.body,
            Some(&self.detail_query),
            page.encoding.as_deref(),
            &self.narrowing,
        )
        .into_matches();

        parse_record(&texts, segment, &now())
    }

    /// Folds one processed URL into the state and appends its row.
    async fn commit(&self, url: &str, record: Option<ProductRecord>) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        state.pending.remove(url);
        state.scraped.insert(url.to_owned());
        let Some(record) = record else {
            return false;
        };

        if let Some(dir) = &self.output_dir {
            let kind = record.kind();
            let date = today();
            let file_name = paths::product_file_name(&self.retailer, kind.plural(), &date);
            let path = paths::output_path(dir, &file_name);
            if state.sink.append_row(&path, &record.header(), &record.row()) {
                state.written.insert(path, (kind, date));
            }
        }

        state.records.push(record);
        true
    }

    /// Uploads every file written today, concurrently.
    ///
    /// Returns `None` when no upload target is configured.
    pub async fn upload<S: ObjectStore>(&self, store: &S) -> Option<UploadStats> {
        let target = self.upload.as_ref()?;
        let today = today();

        let jobs: Vec<UploadJob> = self
            .state
            .lock()
            .await
            .written
            .iter()
            .filter(|(_, (_, date))| *date == today)
            .map(|(path, (kind, date))| UploadJob {
                key: target.partitioned_key(kind.plural(), date),
                local: path.clone(),
            })
            .collect();

        if jobs.is_empty() {
            log::info!("Uploading cancelled since nothing was scraped today");
            return Some(UploadStats::default());
        }

        let stats = upload_all(store, &jobs).await;
        log::info!("Upload finished: {stats}");
        Some(stats)
    }
}

/// Builds a record from a page's query matches.
///
/// # Errors
///
/// * [`ExtractorError::UnknownCategory`] if `segment` is not a device
///   segment.
/// * [`ExtractorError::MissingMetadata`] if no fragment looks like JSON.
/// * [`ExtractorError::Json`] if the first JSON fragment does not parse.
/// * [`ExtractorError::MissingField`] if an identity field is absent.
pub fn parse_record<S: AsRef<str>>(
    texts: &[S],
    segment: &str,
    updated_at: &str,
) -> Result<ProductRecord, ExtractorError> {
    let fragments = fragments::split_fragments(texts);
    let raw = fragments
        .json
        .first()
        .ok_or(ExtractorError::MissingMetadata)?;
    let data: Value = serde_json::from_str(raw)?;
    let common = common::parse_common_info(&data, updated_at)?;

    let category = classify::classify(segment, &common.hint).ok_or_else(|| {
        ExtractorError::UnknownCategory {
            segment: segment.to_owned(),
        }
    })?;
    let kind = category.kind();

    Ok(ProductRecord::new(category, common.info, |field| {
        rules::resolve(field, kind, &fragments.specs)
    }))
}
