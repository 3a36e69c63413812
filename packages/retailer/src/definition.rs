//! Config-driven retailer definition.
//!
//! A [`RetailerDefinition`] captures everything site-specific about a
//! retailer: where crawling starts, which links are followed, how product
//! pages are narrowed and queried, run parameters and upload targets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use retail_crawl_scraper::{PathQuery, RunOptions, compile_narrowing};
use retail_crawl_storage::UploadTarget;
use serde::Deserialize;

use crate::ConfigError;

/// A complete retailer definition, usually loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RetailerDefinition {
    /// Unique identifier (e.g., `"thegioididong"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Crawl starting point.
    pub seed_url: String,
    pub crawl: CrawlConfig,
    pub scrape: ScrapeConfig,
}

/// How product links are discovered.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Path query selecting in-scope link targets on every page.
    pub link_query: String,
    /// Regexes restricting which parts of a page are parsed.
    #[serde(default)]
    pub narrow_patterns: Vec<String>,
    /// Directory holding `<retailer>_urls.csv`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub upload: Option<UploadTarget>,
}

/// How product detail pages are read.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// Path query selecting the JSON metadata block and the spec list.
    pub detail_query: String,
    #[serde(default)]
    pub narrow_patterns: Vec<String>,
    /// Directory holding the dated product files.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub upload: Option<UploadTarget>,
}

/// Optional run parameter overrides. Unset values keep the
/// [`RunOptions`] defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    pub timeout_secs: Option<f64>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
    pub inter_batch_delay_secs: Option<f64>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
    pub follow_redirects: Option<bool>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        message: format!("{field} = {value}: {e}"),
    })
}

impl RunConfig {
    /// Applies these overrides on top of [`RunOptions::default`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for negative or non-finite
    /// durations.
    pub fn to_options(&self) -> Result<RunOptions, ConfigError> {
        let mut options = RunOptions::default();

        if let Some(secs) = self.timeout_secs {
            options = options.with_timeout(seconds("timeout_secs", secs)?);
        }
        if let Some(concurrency) = self.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if let Some(batch_size) = self.batch_size {
            options = options.with_batch_size(batch_size);
        }
        if let Some(secs) = self.inter_batch_delay_secs {
            options = options.with_inter_batch_delay(Some(seconds("inter_batch_delay_secs", secs)?));
        }
        if let Some(retries) = self.retries {
            options = options.with_retries(retries);
        }
        if let Some(secs) = self.retry_delay_secs {
            options = options.with_retry_delay(seconds("retry_delay_secs", secs)?);
        }
        if let Some(follow) = self.follow_redirects {
            options = options.with_follow_redirects(follow);
        }
        for (name, value) in &self.headers {
            options = options.with_header(name, value);
        }

        Ok(options)
    }
}

impl CrawlConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Query`] if the link query does not compile.
    pub fn link_query(&self) -> Result<PathQuery, ConfigError> {
        Ok(PathQuery::parse(&self.link_query)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Query`] if a pattern does not compile.
    pub fn narrowing(&self) -> Result<Vec<Regex>, ConfigError> {
        Ok(compile_narrowing(&self.narrow_patterns)?)
    }
}

impl ScrapeConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Query`] if the detail query does not compile.
    pub fn detail_query(&self) -> Result<PathQuery, ConfigError> {
        Ok(PathQuery::parse(&self.detail_query)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Query`] if a pattern does not compile.
    pub fn narrowing(&self) -> Result<Vec<Regex>, ConfigError> {
        Ok(compile_narrowing(&self.narrow_patterns)?)
    }
}

impl RetailerDefinition {
    /// Compiles every query and pattern and checks run parameters and
    /// upload targets.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "id is empty".to_owned(),
            });
        }
        self.crawl.link_query()?;
        self.crawl.narrowing()?;
        self.crawl.run.to_options()?;
        self.scrape.detail_query()?;
        self.scrape.narrowing()?;
        self.scrape.run.to_options()?;
        for upload in [&self.crawl.upload, &self.scrape.upload].into_iter().flatten() {
            upload.validate()?;
        }
        Ok(())
    }
}

/// Parses a retailer definition from a TOML string.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or does not
/// match [`RetailerDefinition`].
pub fn parse_retailer_toml(name: &str, toml_str: &str) -> Result<RetailerDefinition, ConfigError> {
    toml::de::from_str(toml_str).map_err(|e| ConfigError::Parse {
        name: name.to_owned(),
        message: e.to_string(),
    })
}

/// Loads and validates a retailer definition from a file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, otherwise see
/// [`parse_retailer_toml`] and [`RetailerDefinition::validate`].
pub fn load_from_path(path: &Path) -> Result<RetailerDefinition, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let definition = parse_retailer_toml(&path.display().to_string(), &content)?;
    definition.validate()?;
    log::debug!("Loaded retailer '{}' from {}", definition.id, path.display());
    Ok(definition)
}
