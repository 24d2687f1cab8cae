//! Recipient address validation
//!
//! Validation is syntactic only; no DNS or MX lookups are performed.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Validates and normalizes a single address.
pub trait AddressValidator: Send + Sync + fmt::Debug {
    /// Return the normalized form of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when the address is not usable.
    fn validate(&self, address: &str) -> Result<String>;
}

/// RFC 5322 addr-spec check backed by `lettre::Address`, with the domain
/// lowercased.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictValidator;

impl AddressValidator for StrictValidator {
    fn validate(&self, address: &str) -> Result<String> {
        let trimmed = address.trim();
        let parsed: lettre::Address = trimmed
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{trimmed}: {e}")))?;
        Ok(format!(
            "{}@{}",
            parsed.user(),
            parsed.domain().to_ascii_lowercase()
        ))
    }
}

/// A validator shared between sessions and dispatch workers.
pub type SharedValidator = Arc<dyn AddressValidator>;

/// Minimal check: one `@` with non-empty local part and a dotted domain
/// free of whitespace.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] when the shape is wrong.
pub fn check_syntax(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let invalid = || Error::InvalidAddress(trimmed.to_string());

    let (local, domain) = trimmed.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || local.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || trimmed.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
    {
        return Err(invalid());
    }
    Ok(trimmed.to_string())
}

/// Validate with `validator` if set, otherwise fall back to [`check_syntax`].
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for the first unusable address.
pub fn validate_with(validator: Option<&dyn AddressValidator>, address: &str) -> Result<String> {
    match validator {
        Some(v) => v.validate(address),
        None => check_syntax(address),
    }
}
