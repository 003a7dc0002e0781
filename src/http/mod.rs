//! HTTP protocol layer module
//!
//! Protocol-level helpers shared by the handlers: content types, cache
//! validators, byte ranges and response builders.

pub mod cache;
pub mod mime;
pub mod range;
pub mod response;

pub use range::{parse_range_header, RangeParseResult};
pub use response::{
    build_304_response, build_416_response, build_error_response, build_file_response,
    build_html_response, build_partial_response, build_redirect_response, escape_html, FileMeta,
};
