//! HTTP cache validation module
//!
//! `ETag`/`Last-Modified` generation and conditional request handling.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Generate a weak `ETag` from file size and modification time
///
/// Avoids hashing file contents; any write that changes size or mtime
/// yields a new tag.
pub fn generate_etag(len: u64, modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    format!("W/\"{len:x}-{secs:x}\"")
}

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE).to_string()
}

/// Parse an HTTP date; returns `None` for anything unparseable
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Weak comparison of `If-None-Match` against the server `ETag`
///
/// Supports a single tag, a comma separated list, and `*`.
pub fn check_etag_match(if_none_match: &str, etag: &str) -> bool {
    let opaque = etag.trim_start_matches("W/");
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == opaque
    })
}

/// Whether a conditional GET/HEAD should be answered with 304
///
/// `If-None-Match` takes precedence; `If-Modified-Since` is only consulted
/// when it is absent.
pub fn is_not_modified(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    etag: &str,
    modified: Option<SystemTime>,
) -> bool {
    if let Some(tags) = if_none_match {
        return check_etag_match(tags, etag);
    }
    let (Some(since), Some(modified)) = (if_modified_since.and_then(parse_http_date), modified)
    else {
        return false;
    };
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}
