//! Output file naming.

use std::path::{Path, PathBuf};

/// Host labels that carry no retailer identity.
const GENERIC_HOST_LABELS: &[&str] = &["com", "vn", "www"];

/// Derives the retailer slug from a URL's host by dropping generic labels
/// and joining what remains, e.g. `https://www.thegioididong.com/` becomes
/// `thegioididong`.
///
/// Returns `None` if `url` has no host.
#[must_use]
pub fn retailer_slug(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let slug: String = host
        .split('.')
        .filter(|label| !GENERIC_HOST_LABELS.contains(label))
        .collect();

    (!slug.is_empty()).then_some(slug)
}

/// File name of a crawl's URL list: `<slug>_urls.csv`.
#[must_use]
pub fn frontier_file_name(slug: &str) -> String {
    format!("{slug}_urls.csv")
}

/// File name of one day's scraped products of one kind:
/// `<retailer>_<plural>_<YYYY-MM-DD>.csv`.
#[must_use]
pub fn product_file_name(retailer: &str, plural: &str, date: &str) -> String {
    format!("{}_{plural}_{date}.csv", retailer.to_lowercase())
}

/// Joins `dir` and `file_name`.
#[must_use]
pub fn output_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_drops_generic_labels() {
        assert_eq!(
            retailer_slug("https://www.thegioididong.com/dtdd").as_deref(),
            Some("thegioididong")
        );
        assert_eq!(
            retailer_slug("https://cellphones.com.vn/").as_deref(),
            Some("cellphones")
        );
        assert_eq!(
            retailer_slug("http://127.0.0.1:1234/").as_deref(),
            Some("127001")
        );
    }

    #[test]
    fn slug_needs_a_host() {
        assert_eq!(retailer_slug("not a url"), None);
        assert_eq!(retailer_slug("https://www.com.vn/"), None);
    }

    #[test]
    fn file_names() {
        assert_eq!(frontier_file_name("thegioididong"), "thegioididong_urls.csv");
        assert_eq!(
            product_file_name("THEGIOIDIDONG", "phones", "2024-05-01"),
            "thegioididong_phones_2024-05-01.csv"
        );
    }
}
