//! Common product information from the page's schema.org JSON block.

use retail_crawl_product_models::ProductInfo;
use serde_json::Value;

use crate::ExtractorError;
use crate::classify::DimensionHint;

/// Property names carrying the release date.
const RELEASE_LABELS: &[&str] = &["Thời điểm ra mắt", "Thời gian ra mắt", "Năm ra mắt"];

/// Property names carrying dimensions and weight.
const DIMENSION_LABELS: &[&str] = &["Kích thước, khối lượng", "Khối lượng"];

/// Property name listing a wired jack.
const JACK_LABEL: &str = "Jack cắm";

/// Parsed common info plus the hints classification needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonInfo {
    /// Fields shared by every product kind.
    pub info: ProductInfo,
    /// Dimension and jack facts used to tell device kinds apart.
    pub hint: DimensionHint,
}

fn required_str(data: &Value, field: &'static str) -> Result<String, ExtractorError> {
    data.get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .ok_or(ExtractorError::MissingField { field })
}

/// Reads an integer price from a number or a numeric string.
#[allow(clippy::cast_possible_truncation)]
fn as_price(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `(price, onsale_price)`.
///
/// An `AggregateOffer` with a `highPrice` lists that as the price and its
/// offer price as the sale price.
fn prices(offers: Option<&Value>) -> (Option<i64>, Option<i64>) {
    let offer = match offers {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    let Some(offer) = offer else {
        return (None, None);
    };

    let price = offer.get("price").and_then(as_price);
    match offer.get("highPrice").and_then(as_price) {
        Some(high) => {
            let sale = price.or_else(|| offer.get("lowPrice").and_then(as_price));
            (Some(high), sale.filter(|s| *s != high))
        }
        None => (price, None),
    }
}

fn brand(data: &Value) -> Option<String> {
    let brand = data.get("brand")?;
    let name = match brand {
        Value::String(_) => brand,
        _ => brand.get("name")?,
    };
    let name = match name {
        Value::Array(items) => items.first()?,
        other => other,
    };
    name.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// `(name, value)` pairs of `additionalProperty`.
fn properties(data: &Value) -> Vec<(&str, String)> {
    data.get("additionalProperty")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name")?.as_str()?.trim();
                    let value = as_text(item.get("value")?)?;
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parses the product JSON block.
///
/// # Errors
///
/// Returns [`ExtractorError::MissingField`] when `sku`, `name` or `url` is
/// absent. Every other field is optional.
pub fn parse_common_info(data: &Value, updated_at: &str) -> Result<CommonInfo, ExtractorError> {
    let sku = required_str(data, "sku")?;
    let name = required_str(data, "name")?;
    let url = required_str(data, "url")?;
    let (price, onsale_price) = prices(data.get("offers"));

    let rating = data.get("aggregateRating").filter(|r| r.is_object());
    let reviews = rating.and_then(|r| r.get("reviewcount").or_else(|| r.get("reviewCount")));

    let props = properties(data);
    let first_of = |labels: &[&str]| {
        props
            .iter()
            .find(|(name, _)| labels.contains(name))
            .map(|(_, value)| value.clone())
    };

    let info = ProductInfo {
        sku,
        name,
        price,
        onsale_price,
        brand: brand(data),
        rating: rating.and_then(|r| r.get("ratingValue")).and_then(as_f64),
        reviews_count: reviews.and_then(as_count),
        url,
        release_date: first_of(RELEASE_LABELS),
        updated_at: updated_at.to_owned(),
    };

    let hint = DimensionHint {
        dimension: first_of(DIMENSION_LABELS),
        has_jack: props.iter().any(|(name, _)| *name == JACK_LABEL),
    };

    Ok(CommonInfo { info, hint })
}
