//! Input validation and URL normalization
//!
//! Everything here runs before a write. A rejected input leaves storage
//! untouched.

use super::annotation::NewAnnotation;
use super::drawing::NewDrawing;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised for user input that cannot be stored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} is too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

/// Size limits applied to user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum URL length in bytes
    pub max_url_len: usize,
    /// Maximum selected text length in characters
    pub max_selected_text_len: usize,
    /// Maximum comment length in characters
    pub max_comment_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_url_len: 2048,
            max_selected_text_len: 5000,
            max_comment_len: 10_000,
        }
    }
}

/// Normalize a page URL into the form used as a storage key.
///
/// Drops the fragment; scheme and host are lowercased by the parser.
pub fn normalize_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Missing("url"));
    }
    let mut url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" | "file" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }
    url.set_fragment(None);
    Ok(url.into())
}

fn check_url(raw: &str, limits: &Limits) -> Result<String, ValidationError> {
    if raw.len() > limits.max_url_len {
        return Err(ValidationError::TooLong {
            field: "url",
            len: raw.len(),
            max: limits.max_url_len,
        });
    }
    normalize_url(raw)
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

/// Validate a new annotation, returning its normalized URL.
pub fn validate_annotation(input: &NewAnnotation, limits: &Limits) -> Result<String, ValidationError> {
    let url = check_url(&input.url, limits)?;
    check_text("selected text", &input.selected_text, limits.max_selected_text_len)?;
    check_text("comment", &input.comment, limits.max_comment_len)?;
    Ok(url)
}

/// Validate a new drawing, returning its normalized URL.
pub fn validate_drawing(input: &NewDrawing, limits: &Limits) -> Result<String, ValidationError> {
    let url = check_url(&input.url, limits)?;
    if input.canvas_data.is_empty() {
        return Err(ValidationError::Missing("canvas data"));
    }
    Ok(url)
}
