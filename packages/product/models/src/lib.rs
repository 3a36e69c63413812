#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Product category taxonomy and scraped product record types.
//!
//! Every retailer detail page is reduced to a [`ProductRecord`]: the common
//! [`ProductInfo`] parsed from the page's JSON-LD block, a [`Category`]
//! assigned by classification, and the spec columns that belong to the
//! category's [`DeviceKind`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// The coarse device family a detail page belongs to.
///
/// Each kind owns one output file per day and one fixed list of spec
/// columns ([`DeviceKind::spec_fields`]).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    /// Mobile phones (feature phones and smartphones)
    Phone,
    /// Tablets
    Tablet,
    /// Laptops
    Laptop,
    /// Smartwatches and fitness bands
    Watch,
    /// Headphones, earphones and earbuds
    Earphones,
    /// Computer monitors
    Screen,
}

impl DeviceKind {
    /// All device kinds, in output order.
    pub const ALL: &[Self] = &[
        Self::Phone,
        Self::Tablet,
        Self::Laptop,
        Self::Watch,
        Self::Earphones,
        Self::Screen,
    ];

    /// Plural form used in output file names and object keys.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Phone => "phones",
            Self::Tablet => "tablets",
            Self::Laptop => "laptops",
            Self::Watch => "watches",
            Self::Earphones => "earphones",
            Self::Screen => "screens",
        }
    }

    /// The first URL path segment the retailer uses for this kind.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Phone => "dtdd",
            Self::Tablet => "may-tinh-bang",
            Self::Laptop => "laptop",
            Self::Watch => "dong-ho-thong-minh",
            Self::Earphones => "tai-nghe",
            Self::Screen => "man-hinh-may-tinh",
        }
    }

    /// Maps a URL's first path segment to a device kind.
    #[must_use]
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.path_segment() == segment)
    }

    /// Spec columns recorded for this kind, in output order.
    #[must_use]
    pub const fn spec_fields(self) -> &'static [SpecField] {
        use SpecField::{
            Battery, CaseBattery, Charger, Compatible, Connectivity, Control, Cpu, CpuCores,
            CpuSpeed, CpuThreads, FrontcamSpecs, Gpu, Material, MaxRam, Network, Os, Ports,
            PowerConsumption, Ram, RamBus, RamType, RearcamSpecs, ScreenNits, ScreenPanel,
            ScreenRate, ScreenRes, ScreenSize, ScreenTech, ScreenType, SoundTech, Storage,
            WaterResistant, Webcam, Weight,
        };

        match self {
            Self::Phone => &[
                Cpu,
                CpuSpeed,
                Gpu,
                Ram,
                Storage,
                RearcamSpecs,
                FrontcamSpecs,
                ScreenType,
                ScreenSize,
                ScreenPanel,
                ScreenRes,
                ScreenRate,
                ScreenNits,
                Os,
                WaterResistant,
                Battery,
                Charger,
                Weight,
                Material,
                Connectivity,
                Network,
                Ports,
            ],
            Self::Tablet => &[
                Cpu,
                CpuSpeed,
                Gpu,
                Ram,
                Storage,
                RearcamSpecs,
                FrontcamSpecs,
                ScreenSize,
                ScreenPanel,
                ScreenRes,
                ScreenRate,
                Os,
                WaterResistant,
                Battery,
                Charger,
                Weight,
                Material,
                Connectivity,
                Network,
                Ports,
            ],
            Self::Laptop => &[
                Cpu,
                CpuCores,
                CpuThreads,
                CpuSpeed,
                Gpu,
                Ram,
                MaxRam,
                RamType,
                RamBus,
                Storage,
                Webcam,
                ScreenPanel,
                ScreenSize,
                ScreenTech,
                ScreenRes,
                ScreenRate,
                ScreenNits,
                Os,
                Battery,
                Weight,
                Material,
                Connectivity,
                Ports,
            ],
            Self::Watch => &[
                Cpu,
                Storage,
                ScreenType,
                ScreenPanel,
                ScreenSize,
                Os,
                WaterResistant,
                Connectivity,
                Battery,
                Weight,
                Material,
            ],
            Self::Earphones => &[
                SoundTech,
                Compatible,
                Control,
                WaterResistant,
                Ports,
                Connectivity,
                Battery,
                CaseBattery,
                Weight,
            ],
            Self::Screen => &[
                ScreenType,
                ScreenPanel,
                ScreenSize,
                ScreenTech,
                ScreenRes,
                ScreenRate,
                PowerConsumption,
                Ports,
                Weight,
            ],
        }
    }

    /// Full CSV header for records of this kind: base columns followed by
    /// the kind's spec columns.
    #[must_use]
    pub fn header(self) -> Vec<&'static str> {
        BASE_COLUMNS
            .iter()
            .copied()
            .chain(self.spec_fields().iter().map(SpecField::column))
            .collect()
    }
}

/// Fine-grained product category written to the `category` column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Category {
    /// Phone lighter than the smartphone weight threshold
    Phone,
    /// Phone at or above the smartphone weight threshold
    Smartphone,
    /// Laptop
    Laptop,
    /// Tablet
    Tablet,
    /// Watch wider than the smartwatch width threshold
    Smartwatch,
    /// Watch at or below the smartwatch width threshold
    Smartband,
    /// Wired earphones, or the fallback when no dimension data is listed
    Earphones,
    /// Over-ear headphones above the headphone weight threshold
    Headphone,
    /// Wireless in-ear buds
    Earbuds,
    /// Computer monitor
    Screen,
}

impl Category {
    /// The device kind (and therefore output file) this category belongs to.
    #[must_use]
    pub const fn kind(self) -> DeviceKind {
        match self {
            Self::Phone | Self::Smartphone => DeviceKind::Phone,
            Self::Laptop => DeviceKind::Laptop,
            Self::Tablet => DeviceKind::Tablet,
            Self::Smartwatch | Self::Smartband => DeviceKind::Watch,
            Self::Earphones | Self::Headphone | Self::Earbuds => DeviceKind::Earphones,
            Self::Screen => DeviceKind::Screen,
        }
    }
}

/// A category-specific spec column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpecField {
    Cpu,
    CpuCores,
    CpuThreads,
    CpuSpeed,
    Gpu,
    Ram,
    MaxRam,
    RamType,
    RamBus,
    Storage,
    Webcam,
    RearcamSpecs,
    FrontcamSpecs,
    ScreenTech,
    ScreenType,
    ScreenSize,
    ScreenPanel,
    ScreenRes,
    ScreenRate,
    ScreenNits,
    Os,
    WaterResistant,
    Battery,
    Charger,
    Weight,
    Material,
    Connectivity,
    Network,
    Ports,
    SoundTech,
    Compatible,
    Control,
    CaseBattery,
    PowerConsumption,
}

impl SpecField {
    /// Column name in the output file.
    #[must_use]
    pub fn column(&self) -> &'static str {
        (*self).into()
    }
}

/// Columns shared by every product file, in output order.
pub const BASE_COLUMNS: &[&str] = &[
    "sku",
    "name",
    "price",
    "onsale_price",
    "brand",
    "category",
    "rating",
    "reviews_count",
    "url",
    "release_date",
    "updated_at",
];

/// Common product information parsed from a detail page's metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Retailer SKU.
    pub sku: String,
    /// Product display name.
    pub name: String,
    /// List price in the retailer's currency (whole units).
    pub price: Option<i64>,
    /// Discounted price, when the page advertises one.
    pub onsale_price: Option<i64>,
    /// Brand name.
    pub brand: Option<String>,
    /// Average rating.
    pub rating: Option<f64>,
    /// Number of reviews behind [`Self::rating`].
    pub reviews_count: Option<u64>,
    /// Canonical product URL.
    pub url: String,
    /// Release date exactly as the retailer prints it.
    pub release_date: Option<String>,
    /// Local scrape timestamp (`%Y-%m-%d %H:%M:%S`).
    pub updated_at: String,
}

/// One scraped product.
///
/// Spec values are stored in [`DeviceKind::spec_fields`] order for the
/// record's kind; fields that do not belong to the kind always read as
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    category: Category,
    info: ProductInfo,
    specs: Vec<Option<String>>,
}

impl ProductRecord {
    /// Builds a record, resolving every spec column of the category's kind
    /// through `resolve`.
    #[must_use]
    pub fn new(
        category: Category,
        info: ProductInfo,
        mut resolve: impl FnMut(SpecField) -> Option<String>,
    ) -> Self {
        let specs = category
            .kind()
            .spec_fields()
            .iter()
            .map(|&field| resolve(field))
            .collect();

        Self {
            category,
            info,
            specs,
        }
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.category.kind()
    }

    #[must_use]
    pub const fn info(&self) -> &ProductInfo {
        &self.info
    }

    /// Returns the value of a spec column, or `None` if it was not found on
    /// the page or does not belong to this record's kind.
    #[must_use]
    pub fn spec(&self, field: SpecField) -> Option<&str> {
        self.kind()
            .spec_fields()
            .iter()
            .position(|&f| f == field)
            .and_then(|i| self.specs[i].as_deref())
    }

    /// Iterates the kind's spec columns with their values.
    pub fn specs(&self) -> impl Iterator<Item = (SpecField, Option<&str>)> {
        self.kind()
            .spec_fields()
            .iter()
            .copied()
            .zip(self.specs.iter().map(Option::as_deref))
    }

    /// CSV header matching [`Self::row`].
    #[must_use]
    pub fn header(&self) -> Vec<&'static str> {
        self.kind().header()
    }

    /// Renders the record as CSV cells; `None` becomes an empty cell.
    #[must_use]
    pub fn row(&self) -> Vec<String> {
        fn cell<T: ToString>(value: Option<&T>) -> String {
            value.map(ToString::to_string).unwrap_or_default()
        }

        let info = &self.info;
        let mut row = vec![
            info.sku.clone(),
            info.name.clone(),
            cell(info.price.as_ref()),
            cell(info.onsale_price.as_ref()),
            cell(info.brand.as_ref()),
            self.category.to_string(),
            cell(info.rating.as_ref()),
            cell(info.reviews_count.as_ref()),
            info.url.clone(),
            cell(info.release_date.as_ref()),
            info.updated_at.clone(),
        ];
        row.extend(self.specs.iter().map(|v| cell(v.as_ref())));
        row
    }
}
