//! Parcel identifier extraction from label text.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{OCR_ID_NOT_FOUND, OCR_NO_TEXT};

/// `P-` prefixed ids, `SPX` tracking numbers, or bare runs of 10+ digits.
static PARCEL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(P-[\d-]+|SPX[A-Z0-9]+|\d{10,})").unwrap());

/// Find the parcel identifier in text read off a label.
///
/// Whitespace is collapsed before matching and the match is upper-cased.
/// Blank text yields [`OCR_NO_TEXT`], text without an identifier yields
/// [`OCR_ID_NOT_FOUND`].
pub fn extract_parcel_id(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return OCR_NO_TEXT.to_string();
    }

    let upper = normalized.to_uppercase();
    match PARCEL_ID.find(&upper) {
        Some(m) => m.as_str().to_uppercase(),
        None => OCR_ID_NOT_FOUND.to_string(),
    }
}
