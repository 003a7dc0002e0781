// Connection handling module
// Accepts a TCP connection and serves it with hyper's HTTP/1 implementation

use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderName, REFERER, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::logger::{self, AccessLogEntry};

/// Accept a connection, enforcing the optional connection limit.
///
/// # Arguments
///
/// * `stream` - The TCP stream to handle
/// * `peer_addr` - The peer's socket address
/// * `handler` - Request handler shared by all connections
/// * `config` - Server configuration
/// * `conn_counter` - Active connection counter
pub fn accept_connection<H>(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    handler: &Arc<H>,
    config: &Arc<ServerConfig>,
    conn_counter: &Arc<AtomicUsize>,
) where
    H: Handler + 'static,
{
    // Increment first, then check, so concurrent accepts cannot overshoot
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(handler),
        Arc::clone(config),
        Arc::clone(conn_counter),
    );
}

/// Serve a single connection in a local task.
///
/// Keep-alive follows the configuration. `performance.connection_timeout`
/// bounds how long the server waits for a request head, so idle keep-alive
/// connections are closed; responses already being written are never cut
/// off. 0 disables the bound. The connection counter is decremented when the
/// task ends.
fn handle_connection<H>(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    conn_counter: Arc<AtomicUsize>,
) where
    H: Handler + 'static,
{
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);
        let timeout = Duration::from_secs(config.performance.connection_timeout);

        let mut builder = http1::Builder::new();
        builder.keep_alive(config.performance.keep_alive);
        if !timeout.is_zero() {
            builder.timer(TokioTimer::new()).header_read_timeout(timeout);
        }

        let service_config = Arc::clone(&config);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req: Request<Incoming>| {
                let handler = Arc::clone(&handler);
                let config = Arc::clone(&service_config);
                async move {
                    let started = Instant::now();
                    let response = handler.handle(&req).await;
                    if config.logging.access_log {
                        log_access(
                            &req,
                            &response,
                            peer_addr,
                            started,
                            &config.logging.access_log_format,
                        );
                    }
                    Ok::<_, Infallible>(response)
                }
            }),
        );

        match conn.await {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                logger::log_warning(&format!(
                    "Connection from {peer_addr} idle for {} seconds, closed",
                    timeout.as_secs()
                ));
            }
            Err(err) => logger::log_connection_error(&err),
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

fn log_access<B>(
    req: &Request<B>,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
    format: &str,
) {
    let header = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = http_version(req.version());
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, format);
}

/// `HTTP/1.1` -> `1.1`
fn http_version(version: hyper::Version) -> String {
    let text = format!("{version:?}");
    text.strip_prefix("HTTP/").unwrap_or(&text).to_string()
}
