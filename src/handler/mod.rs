//! Request handler module
//!
//! A [`Handler`] turns a request into a complete response. [`StaticFiles`]
//! serves the document root; [`Cors`] decorates any handler with the
//! `Access-Control-Allow-Origin` header.

pub mod cors;
pub mod listing;
pub mod path;
pub mod static_files;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Request, Response};
use std::future::Future;

pub use cors::Cors;
pub use static_files::StaticFiles;

/// Request-handling capability shared by the file server and its decorators
///
/// Handlers only look at the request line and headers, so the body type is
/// left generic.
pub trait Handler {
    fn handle<B>(&self, req: &Request<B>) -> impl Future<Output = Response<Full<Bytes>>>;
}
