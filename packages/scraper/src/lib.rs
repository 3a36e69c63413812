#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch and parse primitives shared by the crawl frontier and the product
//! extractor.
//!
//! [`fetch`] provides a concurrency-bounded [`Fetcher`] with fixed-delay
//! retries over a pluggable [`Transport`]. [`page`] turns raw bytes into an
//! HTML tree and evaluates a [`PathQuery`] against it. [`options`] carries
//! the per-run parameters and builds the HTTP client, and [`progress`]
//! defines how runs report their counters.

pub mod fetch;
pub mod options;
pub mod page;
pub mod progress;

pub use fetch::{FetchError, FetchResult, Fetcher, Transport};
pub use options::{ClientError, RunOptions};
pub use page::{Extracted, PathQuery, QueryError, compile_narrowing, extract};
pub use progress::{BatchProgress, ProgressObserver};
