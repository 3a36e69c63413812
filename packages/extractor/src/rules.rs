//! Declarative spec field rules.
//!
//! Retailers label the same spec several ways, and a few specs are read
//! from a different label depending on the device kind. Each
//! [`FieldRule`] names the accepted labels, which of the matching values
//! to keep, and how to clean the kept value. [`resolve`] applies a rule to
//! the page's `(label, value)` pairs.

use std::sync::LazyLock;

use regex::Regex;
use retail_crawl_product_models::{DeviceKind, SpecField};

static REFRESH_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*\s*Hz").expect("valid regex"));

static NITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\s?nits").expect("valid regex"));

static IP_RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IP[X0-9]+").expect("valid regex"));

static WEIGHT_AFTER_NANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Nặng\s+(\d+\.?\d*)\s*[g(]").expect("valid regex"));

static WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*[g(]").expect("valid regex"));

/// Which matching value a rule keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// The first match.
    First,
    /// Zero-based position among the matches.
    Nth(usize),
    /// The last match.
    Last,
    /// Every distinct value, joined with `", "` in page order.
    JoinDistinct,
}

/// Cleanup applied to the kept value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// The value as it appears on the page.
    Keep,
    /// Text before the first `-`.
    BeforeDash,
    /// Text after the last `-`.
    AfterLastDash,
    /// The `<n> Hz` part.
    RefreshRate,
    /// The `<n> nits` part.
    Nits,
    /// The `IPxx` part.
    IpRating,
    /// The weight in grams, rendered as `<n> g`.
    Grams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// Property names to look for, in order of preference.
    pub labels: &'static [&'static str],
    /// Which of the matching values to keep.
    pub pick: Pick,
    /// Cleanup applied afterwards.
    pub transform: Transform,
}

impl FieldRule {
    const fn first(labels: &'static [&'static str]) -> Self {
        Self {
            labels,
            pick: Pick::First,
            transform: Transform::Keep,
        }
    }

    const fn pick(mut self, pick: Pick) -> Self {
        self.pick = pick;
        self
    }

    const fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// The rule for `field` on a page of `kind`.
#[must_use]
pub const fn rule_for(field: SpecField, kind: DeviceKind) -> FieldRule {
    use DeviceKind::{Earphones, Laptop, Screen, Tablet};

    match field {
        SpecField::Cpu => FieldRule::first(&["Công nghệ CPU", "Chip xử lý (CPU)", "CPU"]),
        SpecField::CpuCores => FieldRule::first(&["Số nhân"]),
        SpecField::CpuThreads => FieldRule::first(&["Số luồng"]),
        SpecField::CpuSpeed => FieldRule::first(&["Tốc độ CPU"]),
        SpecField::Gpu => {
            FieldRule::first(&["Chip đồ hoạ (GPU)", "Chip đồ họa (GPU)", "Card màn hình"])
        }
        SpecField::Ram => FieldRule::first(&["RAM"]),
        SpecField::MaxRam => FieldRule::first(&["Hỗ trợ RAM tối đa"]),
        SpecField::RamType => FieldRule::first(&["Loại RAM"]),
        SpecField::RamBus => FieldRule::first(&["Tốc độ Bus RAM"]),
        SpecField::Storage => {
            FieldRule::first(&["Ổ cứng", "Dung lượng lưu trữ", "Bộ nhớ trong"])
        }
        SpecField::Webcam => FieldRule::first(&["Webcam"]),
        SpecField::RearcamSpecs => match kind {
            Tablet => FieldRule::first(&["Độ phân giải"]).pick(Pick::Nth(1)),
            _ => FieldRule::first(&["Độ phân giải camera sau"]),
        },
        SpecField::FrontcamSpecs => match kind {
            Tablet => FieldRule::first(&["Độ phân giải"]).pick(Pick::Last),
            _ => FieldRule::first(&["Độ phân giải camera trước"]),
        },
        SpecField::ScreenTech => FieldRule::first(&["Công nghệ màn hình"]),
        SpecField::ScreenType => {
            FieldRule::first(&["Chất liệu mặt", "Mặt kính cảm ứng", "Loại màn hình"])
        }
        SpecField::ScreenSize => FieldRule::first(&["Kích thước màn hình", "Màn hình rộng"])
            .transform(Transform::BeforeDash),
        SpecField::ScreenPanel => match kind {
            Laptop | Screen => FieldRule::first(&["Tấm nền"]),
            _ => FieldRule::first(&["Công nghệ màn hình"]),
        },
        SpecField::ScreenRes => FieldRule::first(&["Độ phân giải", "Độ phân giải màn hình"]),
        SpecField::ScreenRate => match kind {
            Laptop | Screen => FieldRule::first(&["Tần số quét"]),
            _ => FieldRule::first(&["Màn hình rộng"]).transform(Transform::RefreshRate),
        },
        SpecField::ScreenNits => match kind {
            Laptop => FieldRule::first(&["Công nghệ màn hình"]).transform(Transform::Nits),
            _ => FieldRule::first(&["Độ sáng tối đa"]),
        },
        SpecField::Os => FieldRule::first(&["Hệ điều hành"]),
        SpecField::WaterResistant => match kind {
            Earphones => FieldRule::first(&["Tiện ích"]).transform(Transform::IpRating),
            _ => FieldRule::first(&["Chống nước / Kháng nước", "Kháng nước, bụi"]),
        },
        SpecField::Battery => FieldRule::first(&[
            "Thông tin Pin",
            "Dung lượng pin",
            "Thời lượng pin tai nghe",
        ]),
        SpecField::Charger => FieldRule::first(&["Hỗ trợ sạc tối đa"]),
        SpecField::Weight => match kind {
            Laptop | Screen => FieldRule::first(&["Khối lượng có chân đế", "Kích thước"])
                .transform(Transform::AfterLastDash),
            _ => FieldRule::first(&["Kích thước, khối lượng", "Khối lượng"])
                .transform(Transform::Grams),
        },
        SpecField::Material => FieldRule::first(&["Chất liệu khung viền", "Chất liệu"]),
        SpecField::Connectivity => FieldRule::first(&[
            "Wifi",
            "Bluetooth",
            "Kết nối khác",
            "Kết nối không dây",
            "Kết nối",
            "Công nghệ kết nối",
        ])
        .pick(Pick::JoinDistinct),
        SpecField::Network => FieldRule::first(&["Mạng di động"]),
        SpecField::Ports => FieldRule::first(&[
            "Jack tai nghe",
            "Cổng kết nối/sạc",
            "Cổng giao tiếp",
            "Cổng sạc",
            "Jack cắm",
            "Cổng kết nối",
        ])
        .pick(Pick::JoinDistinct),
        SpecField::SoundTech => FieldRule::first(&["Công nghệ âm thanh"]),
        SpecField::Compatible => FieldRule::first(&["Tương thích"]),
        SpecField::Control => FieldRule::first(&["Điều khiển"]),
        SpecField::CaseBattery => FieldRule::first(&["Thời lượng pin hộp sạc"]),
        SpecField::PowerConsumption => FieldRule::first(&["Công suất tiêu thụ điện"]),
    }
}

/// Weight in grams, preferring the number after the last `Nặng`.
fn weight_grams(text: &str) -> Option<String> {
    let number = WEIGHT_AFTER_NANG
        .captures_iter(text)
        .last()
        .or_else(|| WEIGHT.captures(text))?
        .get(1)?
        .as_str()
        .to_owned();
    Some(format!("{number} g"))
}

fn apply(transform: Transform, value: &str) -> Option<String> {
    let found = |re: &Regex| re.find(value).map(|m| m.as_str().to_owned());

    match transform {
        Transform::Keep => Some(value.to_owned()),
        Transform::BeforeDash => value.split('-').next().map(|s| s.trim().to_owned()),
        Transform::AfterLastDash => value.rsplit('-').next().map(|s| s.trim().to_owned()),
        Transform::RefreshRate => found(&REFRESH_RATE),
        Transform::Nits => found(&NITS),
        Transform::IpRating => found(&IP_RATING),
        Transform::Grams => weight_grams(value),
    }
}

/// Resolves `field` for a page of `kind` from its spec pairs.
///
/// Returns `None` when no label matches, the picked position does not
/// exist, or the cleaned value is empty.
#[must_use]
pub fn resolve(field: SpecField, kind: DeviceKind, specs: &[(String, String)]) -> Option<String> {
    let rule = rule_for(field, kind);
    let values: Vec<&str> = specs
        .iter()
        .filter(|(label, _)| rule.labels.contains(&label.as_str()))
        .map(|(_, value)| value.trim())
        .collect();

    let picked = match rule.pick {
        Pick::First => values.first().map(|v| (*v).to_owned()),
        Pick::Nth(n) => values.get(n).map(|v| (*v).to_owned()),
        Pick::Last => values.last().map(|v| (*v).to_owned()),
        Pick::JoinDistinct => {
            let mut distinct: Vec<&str> = Vec::new();
            for value in values.into_iter().filter(|v| !v.is_empty()) {
                if !distinct.contains(&value) {
                    distinct.push(value);
                }
            }
            (!distinct.is_empty()).then(|| distinct.join(", "))
        }
    }?;

    apply(rule.transform, &picked).filter(|v| !v.is_empty())
}
