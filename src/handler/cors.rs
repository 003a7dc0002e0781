//! CORS decorator
//!
//! Wraps another handler and stamps `Access-Control-Allow-Origin: *` on the
//! finished response, after every other header has been set and before hyper
//! writes the header block.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN};
use hyper::{Request, Response};

use super::Handler;

/// The only origin value ever sent; the request `Origin` is not reflected
pub const ANY_ORIGIN: &str = "*";

pub struct Cors<H> {
    inner: H,
    allow_any_origin: bool,
}

impl<H: Handler> Cors<H> {
    pub const fn new(inner: H, allow_any_origin: bool) -> Self {
        Self {
            inner,
            allow_any_origin,
        }
    }
}

impl<H: Handler> Handler for Cors<H> {
    async fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let mut response = self.inner.handle(req).await;
        if self.allow_any_origin {
            // insert, not append: exactly one value even if the inner handler set one
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ANY_ORIGIN));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::ORIGIN;
    use hyper::StatusCode;

    /// Answers every request with a fixed status
    struct Fixed {
        status: StatusCode,
        preset_origin: Option<&'static str>,
    }

    impl Handler for Fixed {
        async fn handle<B>(&self, _req: &Request<B>) -> Response<Full<Bytes>> {
            let mut response = Response::new(Full::new(Bytes::from_static(b"body")));
            *response.status_mut() = self.status;
            if let Some(origin) = self.preset_origin {
                response
                    .headers_mut()
                    .append(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(origin));
            }
            response
        }
    }

    fn fixed(status: StatusCode) -> Fixed {
        Fixed {
            status,
            preset_origin: None,
        }
    }

    fn get(origin: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/asset.js");
        if let Some(origin) = origin {
            builder = builder.header(ORIGIN, origin);
        }
        builder.body(()).unwrap()
    }

    #[tokio::test]
    async fn test_adds_header_to_every_status() {
        for status in [
            StatusCode::OK,
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::NOT_FOUND,
            StatusCode::NOT_IMPLEMENTED,
        ] {
            let response = Cors::new(fixed(status), true).handle(&get(None)).await;
            assert_eq!(response.status(), status);
            let values: Vec<_> = response
                .headers()
                .get_all(ACCESS_CONTROL_ALLOW_ORIGIN)
                .iter()
                .collect();
            assert_eq!(values, vec!["*"]);
        }
    }

    #[tokio::test]
    async fn test_origin_is_not_reflected() {
        let response = Cors::new(fixed(StatusCode::OK), true)
            .handle(&get(Some("http://localhost:3000")))
            .await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_replaces_existing_value() {
        let inner = Fixed {
            status: StatusCode::OK,
            preset_origin: Some("http://example.com"),
        };
        let response = Cors::new(inner, true).handle(&get(None)).await;
        assert_eq!(
            response
                .headers()
                .get_all(ACCESS_CONTROL_ALLOW_ORIGIN)
                .iter()
                .count(),
            1
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_disabled_leaves_response_untouched() {
        let response = Cors::new(fixed(StatusCode::OK), false)
            .handle(&get(None))
            .await;
        assert!(!response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
