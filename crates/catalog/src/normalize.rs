//! Input normalization for keys, values and names.
//!
//! Option keys are case-insensitive identities and are stored lower-cased.
//! Option values and variant names keep the casing the administrator typed;
//! their uniqueness is compared through [`identity`].

use storefront_core::{CatalogError, CatalogResult};

/// Trim an option key and lower-case it.
pub fn option_key(raw: &str) -> CatalogResult<String> {
    let trimmed = non_empty(raw, "option key")?;
    Ok(trimmed.to_lowercase())
}

/// Trim an option value, preserving its display casing.
pub fn option_value(raw: &str) -> CatalogResult<String> {
    non_empty(raw, "option value").map(str::to_string)
}

pub fn variant_name(raw: &str) -> CatalogResult<String> {
    non_empty(raw, "variant name").map(str::to_string)
}

pub fn product_name(raw: &str) -> CatalogResult<String> {
    non_empty(raw, "product name").map(str::to_string)
}

/// Case-insensitive comparison form of an already-trimmed string.
pub fn identity(s: &str) -> String {
    s.trim().to_lowercase()
}

fn non_empty<'a>(raw: &'a str, field: &str) -> CatalogResult<&'a str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid_input(format!("{field} cannot be empty")));
    }
    Ok(trimmed)
}
