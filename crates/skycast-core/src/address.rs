//! Free-text address handling.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ForecastError;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Trim and collapse internal whitespace.
///
/// Returns `None` for a missing, empty or whitespace-only address.
pub fn normalize_address(address: Option<&str>) -> Option<String> {
    let trimmed = address?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE_RUN.replace_all(trimmed, " ").into_owned())
}

/// Normalize an address or fail with `InvalidInput`.
pub fn require_address(address: Option<&str>) -> Result<String, ForecastError> {
    normalize_address(address).ok_or_else(|| ForecastError::invalid_input("address is blank"))
}
