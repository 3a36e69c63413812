#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Retailer definitions.
//!
//! Every retailer is described by a TOML file (see [`definition`]). The
//! definitions shipped with the crate are embedded at compile time and
//! listed by [`registry`]; others can be loaded from disk with
//! [`load_from_path`].

pub mod definition;
pub mod registry;

pub use definition::{
    CrawlConfig, RetailerDefinition, RunConfig, ScrapeConfig, load_from_path, parse_retailer_toml,
};
pub use registry::{all_retailers, find_retailer};

/// Errors raised while loading retailer definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The definition file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML is malformed or has the wrong shape.
    #[error("Failed to parse {name}: {message}")]
    Parse {
        /// File or registry name.
        name: String,
        /// Parser message.
        message: String,
    },

    /// A value parsed but is not usable.
    #[error("Invalid retailer definition: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },

    /// A path query or narrowing pattern does not compile.
    #[error(transparent)]
    Query(#[from] retail_crawl_scraper::QueryError),

    /// An upload target is unusable.
    #[error(transparent)]
    Storage(#[from] retail_crawl_storage::StorageError),

    /// No embedded retailer has this id.
    #[error("Unknown retailer '{id}'")]
    UnknownRetailer {
        /// The id that was looked up.
        id: String,
    },
}
