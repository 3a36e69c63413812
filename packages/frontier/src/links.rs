//! Link resolution.

use reqwest::Url;

/// Resolves `hrefs` against `base`, keeping only `http`/`https` targets.
///
/// Fragments are dropped and duplicates removed; first occurrence order is
/// preserved. Returns an empty list if `base` is not an absolute URL.
#[must_use]
pub fn resolve_links(base: &str, hrefs: &[String]) -> Vec<String> {
    let Ok(base) = Url::parse(base) else {
        log::warn!("Cannot resolve links against '{base}'");
        return Vec::new();
    };

    let mut resolved: Vec<String> = Vec::with_capacity(hrefs.len());
    for href in hrefs {
        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        let Ok(mut url) = base.join(href) else {
            log::trace!("Skipping unparseable link '{href}'");
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        url.set_fragment(None);
        let url = url.to_string();
        if !resolved.contains(&url) {
            resolved.push(url);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    #[test]
    fn relative_links_become_absolute_and_deduplicate() {
        let found = resolve_links(
            "https://www.shop.com/",
            &strings(&["/laptop/a.html", "/laptop/a.html", "/dtdd/b.html#specs"]),
        );
        assert_eq!(
            found,
            strings(&["https://www.shop.com/laptop/a.html", "https://www.shop.com/dtdd/b.html"])
        );
    }

    #[test]
    fn non_http_targets_are_dropped() {
        let found = resolve_links(
            "https://www.shop.com/dtdd",
            &strings(&["mailto:a@b.c", "javascript:void(0)", "  ", "tai-nghe/x"]),
        );
        assert_eq!(found, strings(&["https://www.shop.com/tai-nghe/x"]));
    }

    #[test]
    fn bad_base_yields_nothing() {
        assert!(resolve_links("/relative", &strings(&["/a"])).is_empty());
    }
}
