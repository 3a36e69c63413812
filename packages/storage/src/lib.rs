#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Upload of output files to S3-compatible object storage.
//!
//! Uploads compare **size + MD5/ETag** against the remote object first and
//! skip the transfer when they already match, so re-running an unchanged
//! job does not re-send its files.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `AWS_ACCESS_KEY_ID` | Yes | Access key |
//! | `AWS_SECRET_ACCESS_KEY` | Yes | Secret key |
//! | `AWS_REGION` | No | Region, `us-east-1` when unset |
//! | `AWS_ENDPOINT_URL` | No | Custom endpoint for S3-compatible stores |

use std::future::Future;
use std::path::{Path, PathBuf};

use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use serde::Deserialize;

const DEFAULT_REGION: &str = "us-east-1";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// The upload target is unusable.
    #[error("Invalid upload target: {message}")]
    InvalidTarget {
        /// What is wrong with it.
        message: String,
    },

    /// S3 `HeadObject` failed.
    #[error("Failed to head s3://{bucket}/{key}: {source}")]
    Head {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error reading local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where output files go: a bucket and a key prefix.
///
/// Only `bucket` and `prefix` (also accepted as `obj_prefix`) are allowed;
/// any other key is rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadTarget {
    /// Destination bucket.
    pub bucket: String,
    /// Prepended verbatim to every object key.
    #[serde(default, alias = "obj_prefix")]
    pub prefix: String,
}

impl UploadTarget {
    /// Targets `bucket`, storing objects under `prefix`.
    #[must_use]
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
        }
    }

    /// Checks that the target names a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTarget`] if the bucket is blank or
    /// contains a `/`.
    pub fn validate(&self) -> Result<(), StorageError> {
        let bucket = self.bucket.trim();
        if bucket.is_empty() {
            return Err(StorageError::InvalidTarget {
                message: "bucket is required".to_owned(),
            });
        }
        if bucket.contains('/') {
            return Err(StorageError::InvalidTarget {
                message: format!("bucket '{bucket}' must not contain '/'"),
            });
        }
        Ok(())
    }

    /// `<prefix><file_name>`.
    #[must_use]
    pub fn key_for(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.prefix)
    }

    /// `<prefix><dataset>/date=<date>/<dataset>.csv`.
    #[must_use]
    pub fn partitioned_key(&self, dataset: &str, date: &str) -> String {
        format!("{}{dataset}/date={date}/{dataset}.csv", self.prefix)
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was sent.
    Uploaded,
    /// The remote object already matched.
    Unchanged,
    /// The local file does not exist.
    Missing,
}

/// Counters for a group of uploads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    /// Files sent to the store.
    pub uploaded: u64,
    /// Files the store already held unchanged.
    pub unchanged: u64,
    /// Files absent locally.
    pub missing: u64,
    /// Files the store rejected.
    pub failed: u64,
}

impl UploadStats {
    pub const fn record(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => self.uploaded += 1,
            UploadOutcome::Unchanged => self.unchanged += 1,
            UploadOutcome::Missing => self.missing += 1,
        }
    }

    /// Total number of files considered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.uploaded + self.unchanged + self.missing + self.failed
    }
}

impl std::fmt::Display for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped (unchanged), {} missing, {} failed",
            self.uploaded, self.unchanged, self.missing, self.failed
        )
    }
}

/// A destination for local files.
pub trait ObjectStore: Send + Sync {
    /// Bucket the store writes to.
    fn bucket(&self) -> &str;

    /// Uploads `local` under `key`.
    fn put_file(
        &self,
        key: &str,
        local: &Path,
    ) -> impl Future<Output = Result<UploadOutcome, StorageError>> + Send;
}

/// One pending upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub key: String,
    pub local: PathBuf,
}

/// Runs every job concurrently. Failures are logged and counted, never
/// returned.
pub async fn upload_all<S: ObjectStore>(store: &S, jobs: &[UploadJob]) -> UploadStats {
    let results = futures::future::join_all(jobs.iter().map(|job| async move {
        let file = job
            .local
            .file_name()
            .map_or_else(|| job.local.display().to_string(), |n| n.to_string_lossy().into_owned());
        log::info!("Start uploading {file} to {}...", store.bucket());
        let result = store.put_file(&job.key, &job.local).await;
        match &result {
            Ok(UploadOutcome::Uploaded) => log::info!("Uploading {file} successfully."),
            Ok(_) => {}
            Err(e) => log::error!("Uploading {file} failed: {e}"),
        }
        result
    }))
    .await;

    let mut stats = UploadStats::default();
    for result in results {
        match result {
            Ok(outcome) => stats.record(outcome),
            Err(_) => stats.failed += 1,
        }
    }
    stats
}

/// Remote object metadata from `HeadObject`.
struct RemoteMeta {
    size: u64,
    etag: Option<String>,
}

/// [`ObjectStore`] backed by an S3-compatible service.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Creates a store for `target` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTarget`] if `target` does not
    /// validate, or [`StorageError::MissingEnv`] if a required variable is
    /// unset.
    pub fn from_env(target: &UploadTarget) -> Result<Self, StorageError> {
        target.validate()?;

        let access_key = require_env("AWS_ACCESS_KEY_ID")?;
        let secret_key = require_env("AWS_SECRET_ACCESS_KEY")?;
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_owned());
        let endpoint = std::env::var("AWS_ENDPOINT_URL").ok();

        let creds = Credentials::new(&access_key, &secret_key, None, None, "retail-crawl-env");
        let mut config = aws_sdk_s3::Config::builder()
            .region(Region::new(region))
            .credentials_provider(creds);
        if let Some(endpoint) = &endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config.build()),
            bucket: target.bucket.trim().to_owned(),
        })
    }

    /// Fetch object metadata via `HeadObject`.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, key: &str) -> Result<Option<RemoteMeta>, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                #[allow(clippy::cast_sign_loss)] // content-length is non-negative
                let size = output.content_length().unwrap_or(0) as u64;
                let etag = output.e_tag().map(str::to_string);
                Ok(Some(RemoteMeta { size, etag }))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(StorageError::Head {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }
}

impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_file(&self, key: &str, local: &Path) -> Result<UploadOutcome, StorageError> {
        if !local.exists() {
            log::warn!("{} does not exist locally, skipping", local.display());
            return Ok(UploadOutcome::Missing);
        }

        if let Some(remote) = self.head(key).await?
            && is_local_match(local, remote.size, remote.etag.as_deref()).await
        {
            log::info!(
                "{} -> s3://{}/{key}: skipped (unchanged)",
                local.display(),
                self.bucket
            );
            return Ok(UploadOutcome::Unchanged);
        }

        let data = tokio::fs::read(local).await?;
        log::debug!(
            "Pushing {} -> s3://{}/{key} ({} bytes)",
            local.display(),
            self.bucket,
            data.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(UploadOutcome::Uploaded)
    }
}

/// Checks whether a local file matches a remote object's size and, for
/// single-part uploads, its MD5 `ETag`.
async fn is_local_match(local: &Path, remote_size: u64, etag: Option<&str>) -> bool {
    let Ok(meta) = tokio::fs::metadata(local).await else {
        return false;
    };
    if meta.len() != remote_size {
        return false;
    }

    if let Some(etag) = etag {
        let clean = etag.trim_matches('"');
        // Multipart ETags look like "abc123-5"
        if !clean.contains('-') && clean.len() == 32 {
            if let Ok(local_md5) = compute_md5(local).await {
                return local_md5 == clean;
            }
        }
    }

    true
}

async fn compute_md5(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_md5_sync(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn compute_md5_sync(path: &Path) -> Result<String, std::io::Error> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}

fn require_env(name: &str) -> Result<String, StorageError> {
    std::env::var(name).map_err(|_| StorageError::MissingEnv {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        keys: Mutex<Vec<String>>,
    }

    impl ObjectStore for RecordingStore {
        fn bucket(&self) -> &str {
            "test-bucket"
        }

        async fn put_file(&self, key: &str, local: &Path) -> Result<UploadOutcome, StorageError> {
            if !local.exists() {
                return Ok(UploadOutcome::Missing);
            }
            if key.contains("broken") {
                return Err(StorageError::Upload {
                    bucket: "test-bucket".to_owned(),
                    key: key.to_owned(),
                    source: "refused".into(),
                });
            }
            self.keys.lock().unwrap().push(key.to_owned());
            Ok(UploadOutcome::Uploaded)
        }
    }

    #[test]
    fn target_accepts_both_prefix_spellings() {
        let a: UploadTarget = toml::from_str("bucket = \"b\"\nprefix = \"crawled/\"").unwrap();
        let b: UploadTarget = toml::from_str("bucket = \"b\"\nobj_prefix = \"crawled/\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key_for("shop_urls.csv"), "crawled/shop_urls.csv");
    }

    #[test]
    fn target_rejects_unknown_keys() {
        let parsed: Result<UploadTarget, _> =
            toml::from_str("bucket = \"b\"\nregion = \"x\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn target_requires_a_bucket() {
        assert!(UploadTarget::new("  ", "x/").validate().is_err());
        assert!(UploadTarget::new("a/b", "").validate().is_err());
        assert!(UploadTarget::new("crawling-to-dwh", "").validate().is_ok());
    }

    #[test]
    fn partitioned_key_layout() {
        let target = UploadTarget::new("crawling-to-dwh", "bronze/");
        assert_eq!(
            target.partitioned_key("phones", "2024-05-01"),
            "bronze/phones/date=2024-05-01/phones.csv"
        );
        assert_eq!(
            UploadTarget::new("b", "").partitioned_key("laptops", "2024-05-01"),
            "laptops/date=2024-05-01/laptops.csv"
        );
    }

    #[test]
    fn md5_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(
            compute_md5_sync(&path).unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn local_match_checks_size_then_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "hello").unwrap();

        assert!(is_local_match(&path, 5, Some("\"5d41402abc4b2a76b9719d911017c592\"")).await);
        assert!(!is_local_match(&path, 5, Some("\"00000000000000000000000000000000\"")).await);
        assert!(!is_local_match(&path, 6, None).await);
        assert!(is_local_match(&path, 5, Some("\"abc-2\"")).await);
        assert!(!is_local_match(&dir.path().join("absent"), 5, None).await);
    }

    #[tokio::test]
    async fn upload_all_counts_every_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.csv");
        std::fs::write(&present, "x").unwrap();

        let jobs = vec![
            UploadJob {
                key: "p/a.csv".to_owned(),
                local: present.clone(),
            },
            UploadJob {
                key: "p/missing.csv".to_owned(),
                local: dir.path().join("missing.csv"),
            },
            UploadJob {
                key: "p/broken.csv".to_owned(),
                local: present,
            },
        ];

        let store = RecordingStore::default();
        let stats = upload_all(&store, &jobs).await;

        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.missing, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(*store.keys.lock().unwrap(), vec!["p/a.csv".to_owned()]);
    }
}
