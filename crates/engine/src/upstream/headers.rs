//! Freshness headers.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

// IMF-fixdate, the only form servers are allowed to send (RFC 9110 §5.6.7).
const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Parse a `Last-Modified` value.
pub(crate) fn parse_last_modified(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), IMF_FIXDATE).ok().map(PrimitiveDateTime::assume_utc)
}

/// Extract `max-age` from a `Cache-Control` value.
///
/// `no-store` and `no-cache` mean the response may not be reused at all.
pub(crate) fn parse_max_age(value: &str) -> Option<u64> {
    let mut max_age = None;
    for directive in value.split(',').map(str::trim) {
        let (name, argument) = directive.split_once('=').unwrap_or((directive, ""));
        match name.trim().to_ascii_lowercase().as_str() {
            "no-store" | "no-cache" => return Some(0),
            "max-age" => max_age = argument.trim().trim_matches('"').parse().ok(),
            _ => {},
        }
    }
    max_age
}
