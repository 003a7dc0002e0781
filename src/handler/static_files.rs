//! Static file serving module
//!
//! Maps request paths onto the document root and serves files, index pages
//! and directory listings. Errors become HTML error responses.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE, SERVER,
};
use hyper::{Method, Request, Response, StatusCode};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{listing, path::translate_path, Handler};
use crate::config::HttpConfig;
use crate::error::ServerError;
use crate::http::{self, cache, mime, FileMeta, RangeParseResult};
use crate::logger;

/// Serves files below a canonical document root
pub struct StaticFiles {
    root: PathBuf,
    index_files: Vec<String>,
    server_name: Option<HeaderValue>,
}

impl StaticFiles {
    /// Create a handler for `root`, which must be an existing directory
    pub fn new(root: &Path, http: &HttpConfig) -> Result<Self, ServerError> {
        let root_error = |source| ServerError::Root {
            path: root.to_path_buf(),
            source,
        };
        let canonical = std::fs::canonicalize(root).map_err(root_error)?;
        if !canonical.is_dir() {
            return Err(root_error(io::Error::other("not a directory")));
        }

        let server_name = match HeaderValue::from_str(&http.server_name) {
            Ok(value) => Some(value),
            Err(_) => {
                logger::log_warning(&format!(
                    "Ignoring invalid server name '{}'",
                    http.server_name
                ));
                None
            }
        };

        Ok(Self {
            root: canonical,
            index_files: http.index_files.clone(),
            server_name,
        })
    }

    async fn respond<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let method = req.method();
        if method != Method::GET && method != Method::HEAD {
            return http::build_error_response(
                StatusCode::NOT_IMPLEMENTED,
                &format!("Unsupported method ('{method}')"),
                false,
            );
        }
        let is_head = method == Method::HEAD;

        let raw_path = req.uri().path();
        let path = translate_path(&self.root, raw_path);
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => return io_error_response(&e, is_head),
        };

        if metadata.is_dir() {
            if let Err(response) = self.check_contained(&path, is_head).await {
                return response;
            }
            if !raw_path.ends_with('/') {
                let location = match req.uri().query() {
                    Some(query) => format!("{raw_path}/?{query}"),
                    None => format!("{raw_path}/"),
                };
                return http::build_redirect_response(&location);
            }
            if let Some(index) = self.find_index(&path).await {
                return self.serve_file(req.headers(), &index, is_head).await;
            }
            return serve_listing(&path, raw_path, is_head).await;
        }

        if raw_path.ends_with('/') {
            return not_found(is_head);
        }
        self.serve_file(req.headers(), &path, is_head).await
    }

    async fn find_index(&self, dir: &Path) -> Option<PathBuf> {
        for name in &self.index_files {
            let candidate = dir.join(name);
            if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
                return Some(candidate);
            }
        }
        None
    }

    /// Reject paths that resolve outside the root through symlinks
    async fn check_contained(
        &self,
        path: &Path,
        is_head: bool,
    ) -> Result<(), Response<Full<Bytes>>> {
        let canonical = fs::canonicalize(path)
            .await
            .map_err(|e| io_error_response(&e, is_head))?;
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            logger::log_warning(&format!(
                "Path escapes document root: {} -> {}",
                path.display(),
                canonical.display()
            ));
            Err(http::build_error_response(
                StatusCode::FORBIDDEN,
                "Forbidden",
                is_head,
            ))
        }
    }

    /// Serve a regular file.
    ///
    /// Validators, `HEAD`, `304` and `416` come from metadata alone; the file
    /// is only opened to read the bytes that go into the body.
    async fn serve_file(
        &self,
        headers: &HeaderMap,
        path: &Path,
        is_head: bool,
    ) -> Response<Full<Bytes>> {
        if let Err(response) = self.check_contained(path, is_head).await {
            return response;
        }

        let metadata = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return not_found(is_head),
            Err(e) => return io_error_response(&e, is_head),
        };
        let len = metadata.len();
        let modified = metadata.modified().ok();
        let etag = cache::generate_etag(len, modified);
        let last_modified = modified.map(cache::format_http_date);

        if cache::is_not_modified(
            header_str(headers, &IF_NONE_MATCH),
            header_str(headers, &IF_MODIFIED_SINCE),
            &etag,
            modified,
        ) {
            return http::build_304_response(&etag, last_modified.as_deref());
        }

        let meta = FileMeta {
            content_type: mime::content_type_for(path),
            etag: &etag,
            last_modified: last_modified.as_deref(),
            len,
        };

        match http::parse_range_header(header_str(headers, &RANGE), len) {
            RangeParseResult::Satisfiable(range) => {
                match read_body(path, range.start, range.content_length(), is_head).await {
                    Ok(data) => http::build_partial_response(data, &meta, range, is_head),
                    Err(response) => response,
                }
            }
            RangeParseResult::NotSatisfiable => http::build_416_response(len, is_head),
            RangeParseResult::Ignored => match read_body(path, 0, len, is_head).await {
                Ok(data) => http::build_file_response(data, &meta, is_head),
                Err(response) => response,
            },
        }
    }
}

impl Handler for StaticFiles {
    async fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let mut response = self.respond(req).await;
        if let Some(server) = &self.server_name {
            response.headers_mut().insert(SERVER, server.clone());
        }
        response
    }
}

async fn serve_listing(dir: &Path, raw_path: &str, is_head: bool) -> Response<Full<Bytes>> {
    match listing::read_entries(dir).await {
        Ok(entries) => http::build_html_response(listing::render(raw_path, &entries), is_head),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => http::build_error_response(
            StatusCode::FORBIDDEN,
            "No permission to list directory",
            is_head,
        ),
        Err(e) => io_error_response(&e, is_head),
    }
}

/// Body bytes for a file response; `HEAD` never touches the file
async fn read_body(
    path: &Path,
    start: u64,
    len: u64,
    is_head: bool,
) -> Result<Bytes, Response<Full<Bytes>>> {
    if is_head {
        return Ok(Bytes::new());
    }
    read_span(path, start, len).await.map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            logger::log_error(&format!("Failed to read '{}': {e}", path.display()));
        }
        io_error_response(&e, is_head)
    })
}

/// Read at most `len` bytes starting at byte offset `start`
async fn read_span(path: &Path, start: u64, len: u64) -> io::Result<Bytes> {
    let mut file = fs::File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    let mut data = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    file.take(len).read_to_end(&mut data).await?;
    Ok(Bytes::from(data))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn not_found(is_head: bool) -> Response<Full<Bytes>> {
    http::build_error_response(StatusCode::NOT_FOUND, "File not found", is_head)
}

fn io_error_response(err: &io::Error, is_head: bool) -> Response<Full<Bytes>> {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            http::build_error_response(StatusCode::FORBIDDEN, "Forbidden", is_head)
        }
        _ => not_found(is_head),
    }
}
