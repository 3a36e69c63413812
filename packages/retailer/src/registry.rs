//! Compile-time registry of retailer definitions.
//!
//! Each retailer is defined in a TOML file under `retailers/` and embedded
//! with [`include_str!`]. Adding a retailer means adding its TOML file and
//! one line to the list below.

use crate::ConfigError;
use crate::definition::{RetailerDefinition, parse_retailer_toml};

/// TOML configs embedded at compile time.
const RETAILER_TOMLS: &[(&str, &str)] = &[(
    "thegioididong",
    include_str!("../retailers/thegioididong.toml"),
)];

/// Returns every embedded retailer definition.
///
/// # Errors
///
/// Returns the first [`ConfigError`] raised while parsing or validating an
/// embedded definition.
pub fn all_retailers() -> Result<Vec<RetailerDefinition>, ConfigError> {
    RETAILER_TOMLS
        .iter()
        .map(|(name, toml)| {
            let definition = parse_retailer_toml(&format!("{name}.toml"), toml)?;
            definition.validate()?;
            Ok(definition)
        })
        .collect()
}

/// Looks up an embedded retailer by id.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownRetailer`] if no retailer has this id, or
/// the error from [`all_retailers`].
pub fn find_retailer(id: &str) -> Result<RetailerDefinition, ConfigError> {
    all_retailers()?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ConfigError::UnknownRetailer { id: id.to_owned() })
}
