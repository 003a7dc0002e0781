//! HTTP Range request parsing module
//!
//! Single `bytes` ranges only (RFC 9110 section 14.1.2). Multi-range requests
//! are answered with the full representation.

/// Resolved, inclusive byte range within a file of known length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub const fn content_length(self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this range
    pub fn content_range(self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Range header parse result
#[derive(Debug, PartialEq, Eq)]
pub enum RangeParseResult {
    Satisfiable(ByteRange),
    /// Start past the end, or an empty suffix: answer 416
    NotSatisfiable,
    /// No header, another unit, or malformed: serve the full body
    Ignored,
}

/// Parse a `Range` header against a file of `len` bytes
///
/// Supported forms: `bytes=a-b`, `bytes=a-`, `bytes=-n`.
pub fn parse_range_header(range_header: Option<&str>, len: u64) -> RangeParseResult {
    let Some(byte_range) = range_header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeParseResult::Ignored;
    };
    if byte_range.contains(',') {
        return RangeParseResult::Ignored;
    }
    let Some((first, last)) = byte_range.split_once('-') else {
        return RangeParseResult::Ignored;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        return match last.parse::<u64>() {
            Ok(0) => RangeParseResult::NotSatisfiable,
            Ok(_) if len == 0 => RangeParseResult::NotSatisfiable,
            Ok(suffix) => RangeParseResult::Satisfiable(ByteRange {
                start: len.saturating_sub(suffix),
                end: len - 1,
            }),
            Err(_) => RangeParseResult::Ignored,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeParseResult::Ignored;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end < start => return RangeParseResult::Ignored,
            Ok(end) => Some(end),
            Err(_) => return RangeParseResult::Ignored,
        }
    };

    if start >= len {
        return RangeParseResult::NotSatisfiable;
    }
    let end = end.map_or(len - 1, |e| e.min(len - 1));
    RangeParseResult::Satisfiable(ByteRange { start, end })
}
