//! Crawl and scrape jobs wired from a retailer definition.
//!
//! Each stage builds its job from the definition, applies command-line
//! overrides, attaches an `indicatif` spinner and, when asked to, uploads
//! the results to S3 afterwards.

use std::path::{Path, PathBuf};

use retail_crawl_cli_utils::{IndicatifProgress, MultiProgress};
use retail_crawl_extractor::{Extractor, ScrapeReport};
use retail_crawl_frontier::{CrawlReport, Frontier};
use retail_crawl_retailer::{ConfigError, RetailerDefinition, RunConfig};
use retail_crawl_scraper::RunOptions;
use retail_crawl_sink::{paths, read_column};
use retail_crawl_storage::{S3Store, UploadTarget};

type BoxError = Box<dyn std::error::Error>;

/// Command-line overrides applied on top of a retailer definition.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces both the crawl and the scrape output directory.
    pub output_dir: Option<PathBuf>,
    /// Upload results to the definition's upload targets.
    pub upload: bool,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

impl Overrides {
    fn options(&self, run: &RunConfig) -> Result<RunOptions, ConfigError> {
        let mut options = run.to_options()?;
        if let Some(concurrency) = self.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if let Some(batch_size) = self.batch_size {
            options = options.with_batch_size(batch_size);
        }
        Ok(options)
    }

    fn output_dir<'a>(&'a self, configured: Option<&'a Path>) -> Option<&'a Path> {
        self.output_dir.as_deref().or(configured)
    }

    fn upload_target(
        &self,
        configured: Option<&UploadTarget>,
        stage: &str,
    ) -> Result<Option<UploadTarget>, BoxError> {
        if !self.upload {
            return Ok(None);
        }
        configured
            .cloned()
            .map(Some)
            .ok_or_else(|| format!("Upload requested but no {stage} upload target is configured").into())
    }
}

/// Crawls `definition`'s seed and optionally uploads the URL list.
///
/// # Errors
///
/// Returns an error if the definition cannot be turned into a job, the HTTP
/// client cannot be built, or S3 credentials are missing.
pub async fn crawl(
    definition: &RetailerDefinition,
    overrides: &Overrides,
    multi: &MultiProgress,
) -> Result<CrawlReport, BoxError> {
    let config = &definition.crawl;
    let options = overrides.options(&config.run)?.with_progress(
        IndicatifProgress::batch_spinner(multi, &format!("Crawling {}", definition.name)),
    );

    let frontier = Frontier::new(
        &definition.seed_url,
        config.link_query()?,
        config.narrowing()?,
        overrides.output_dir(config.output_dir.as_deref()),
        overrides.upload_target(config.upload.as_ref(), "crawl")?,
    )?;

    let report = frontier.run(&options).await?;

    if let Some(target) = frontier.upload_target() {
        let store = S3Store::from_env(target)?;
        let status = frontier.upload(&store).await;
        log::debug!("Crawl upload: {status:?}");
    }

    Ok(report)
}

/// URLs recorded by the last crawl of `definition`.
fn crawled_urls(
    definition: &RetailerDefinition,
    overrides: &Overrides,
) -> Result<Vec<String>, BoxError> {
    let dir = overrides
        .output_dir(definition.crawl.output_dir.as_deref())
        .ok_or("No crawl output directory configured")?;
    let slug = paths::retailer_slug(&definition.seed_url)
        .ok_or_else(|| format!("Invalid seed URL '{}'", definition.seed_url))?;
    let path = paths::output_path(dir, &paths::frontier_file_name(&slug));

    if !path.exists() {
        return Err(format!(
            "{} not found; run `crawl {}` first",
            path.display(),
            definition.id
        )
        .into());
    }

    Ok(read_column(&path, "url")?)
}

/// Scrapes every URL from the last crawl and optionally uploads today's
/// files.
///
/// Returns `None` when the crawl output lists no URLs.
///
/// # Errors
///
/// Returns an error if the crawl output is missing or unreadable, the
/// definition cannot be turned into a job, the HTTP client cannot be built,
/// or S3 credentials are missing.
pub async fn scrape(
    definition: &RetailerDefinition,
    overrides: &Overrides,
    multi: &MultiProgress,
) -> Result<Option<ScrapeReport>, BoxError> {
    let urls = crawled_urls(definition, overrides)?;
    if urls.is_empty() {
        log::warn!("No crawled urls for {}, nothing to scrape", definition.id);
        return Ok(None);
    }
    log::info!("Loaded {} urls for {}", urls.len(), definition.id);

    let config = &definition.scrape;
    let options = overrides.options(&config.run)?.with_progress(
        IndicatifProgress::batch_spinner(multi, &format!("Scraping {}", definition.name)),
    );

    let extractor = Extractor::new(
        urls,
        config.detail_query()?,
        config.narrowing()?,
        overrides.output_dir(config.output_dir.as_deref()),
        overrides.upload_target(config.upload.as_ref(), "scrape")?,
    )?;

    let report = extractor.execute(&options).await?;

    if let Some(target) = extractor.upload_target() {
        let store = S3Store::from_env(target)?;
        extractor.upload(&store).await;
    }

    Ok(Some(report))
}

/// Crawls, then scrapes if the crawl found URLs that earlier runs had not
/// recorded.
///
/// # Errors
///
/// See [`crawl`] and [`scrape`].
pub async fn run(
    definition: &RetailerDefinition,
    overrides: &Overrides,
    multi: &MultiProgress,
) -> Result<(), BoxError> {
    let report = crawl(definition, overrides, multi).await?;
    if !report.has_new_urls() {
        log::info!("Scraping skipped since the crawl found no new urls");
        return Ok(());
    }

    scrape(definition, overrides, multi).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use retail_crawl_retailer::find_retailer;

    use super::*;

    #[test]
    fn overrides_replace_run_parameters() {
        let definition = find_retailer("thegioididong").unwrap();
        let overrides = Overrides {
            concurrency: Some(2),
            batch_size: Some(4),
            ..Overrides::default()
        };

        let options = overrides.options(&definition.crawl.run).unwrap();
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.batch_size, 4);

        let untouched = Overrides::default().options(&definition.crawl.run).unwrap();
        assert_eq!(untouched.concurrency, 10);
    }

    #[test]
    fn upload_needs_a_configured_target() {
        let overrides = Overrides {
            upload: true,
            ..Overrides::default()
        };
        assert!(overrides.upload_target(None, "crawl").is_err());

        let target = UploadTarget::new("crawling-to-dwh", "crawled/");
        assert_eq!(
            overrides.upload_target(Some(&target), "crawl").unwrap(),
            Some(target.clone())
        );
        assert_eq!(
            Overrides::default()
                .upload_target(Some(&target), "crawl")
                .unwrap(),
            None
        );
    }

    #[test]
    fn scrape_reads_the_crawl_output() {
        let dir = tempfile::tempdir().unwrap();
        let definition = find_retailer("thegioididong").unwrap();
        let overrides = Overrides {
            output_dir: Some(dir.path().to_path_buf()),
            ..Overrides::default()
        };

        assert!(crawled_urls(&definition, &overrides).is_err());

        std::fs::write(
            dir.path().join("thegioididong_urls.csv"),
            "url,created_at\nhttps://www.thegioididong.com/,2024-01-01 00:00:00\n",
        )
        .unwrap();
        assert_eq!(
            crawled_urls(&definition, &overrides).unwrap(),
            vec!["https://www.thegioididong.com/".to_owned()]
        );
    }
}
