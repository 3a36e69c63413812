//! Category classification.
//!
//! The URL's first path segment fixes the device kind. Phones, watches and
//! earphones are then split by the weight or width printed in the page's
//! dimension property.

use std::sync::LazyLock;

use regex::Regex;
use retail_crawl_product_models::{Category, DeviceKind};

/// Phones at or above this weight are smartphones.
pub const SMARTPHONE_MIN_GRAMS: f64 = 135.0;

/// Watches wider than this are smartwatches.
pub const SMARTWATCH_MIN_WIDTH_MM: f64 = 33.5;

/// Earphones heavier than this are headphones.
pub const HEADPHONE_MIN_GRAMS: f64 = 100.0;

static GRAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s?(?:g|\()").expect("valid regex"));

static WIDTH_MM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ngang\s?(\d+\.?\d*)\s?mm").expect("valid regex"));

/// Page facts classification looks at besides the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionHint {
    /// Raw dimension/weight property, if listed.
    pub dimension: Option<String>,
    /// Whether a wired jack is listed.
    pub has_jack: bool,
}

fn first_capture(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// First weight in grams found in `text`.
#[must_use]
pub fn grams(text: &str) -> Option<f64> {
    first_capture(&GRAMS, text)
}

/// First `Ngang <n> mm` width found in `text`.
#[must_use]
pub fn width_mm(text: &str) -> Option<f64> {
    first_capture(&WIDTH_MM, text)
}

/// Assigns the category for a page under `segment`.
///
/// Returns `None` if `segment` is not a device segment. Without dimension
/// data phones fall back to [`Category::Phone`], watches to
/// [`Category::Smartband`] and earphones to [`Category::Earphones`].
#[must_use]
pub fn classify(segment: &str, hint: &DimensionHint) -> Option<Category> {
    let dimension = hint.dimension.as_deref();

    Some(match DeviceKind::from_path_segment(segment)? {
        DeviceKind::Laptop => Category::Laptop,
        DeviceKind::Tablet => Category::Tablet,
        DeviceKind::Screen => Category::Screen,
        DeviceKind::Phone => match dimension.and_then(grams) {
            Some(g) if g >= SMARTPHONE_MIN_GRAMS => Category::Smartphone,
            _ => Category::Phone,
        },
        DeviceKind::Watch => match dimension.and_then(width_mm) {
            Some(w) if w > SMARTWATCH_MIN_WIDTH_MM => Category::Smartwatch,
            _ => Category::Smartband,
        },
        DeviceKind::Earphones => match dimension {
            None => Category::Earphones,
            Some(text) => match grams(text) {
                Some(g) if g > HEADPHONE_MIN_GRAMS => Category::Headphone,
                _ if hint.has_jack => Category::Earphones,
                _ => Category::Earbuds,
            },
        },
    })
}
