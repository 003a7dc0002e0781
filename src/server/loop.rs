// Server loop module
// Accepts connections until shutdown is requested

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::accept_connection;
use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::logger;

/// Run the accept loop on the current `LocalSet`.
///
/// Returns once `shutdown` is notified. Connections still in flight are
/// dropped together with the runtime.
#[allow(clippy::ignored_unit_patterns)]
pub async fn run<H>(
    listener: TcpListener,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    shutdown: Arc<Notify>,
) where
    H: Handler + 'static,
{
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &handler,
                            &config,
                            &active_connections,
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            _ = shutdown.notified() => {
                logger::log_shutdown(active_connections.load(Ordering::SeqCst));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        CorsConfig, HttpConfig, ListenConfig, LoggingConfig, PerformanceConfig,
    };
    use crate::handler::{Cors, StaticFiles};
    use crate::server::bind_listener;
    use std::future::Future;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::LocalSet;

    fn test_config(root: &Path) -> ServerConfig {
        ServerConfig {
            server: ListenConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                root: root.to_path_buf(),
                workers: None,
            },
            cors: CorsConfig {
                allow_any_origin: true,
            },
            http: HttpConfig {
                server_name: "test-server".to_string(),
                index_files: vec!["index.html".to_string()],
            },
            logging: LoggingConfig {
                access_log: false,
                access_log_format: "common".to_string(),
                access_log_file: None,
                error_log_file: None,
            },
            performance: PerformanceConfig {
                keep_alive: true,
                connection_timeout: 5,
                max_connections: None,
            },
        }
    }

    async fn with_server<F, Fut>(config: ServerConfig, client: F)
    where
        F: FnOnce(SocketAddr) -> Fut,
        Fut: Future<Output = ()>,
    {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let files = StaticFiles::new(&config.server.root, &config.http).unwrap();
        let handler = Arc::new(Cors::new(files, config.cors.allow_any_origin));
        let config = Arc::new(config);
        let shutdown = Arc::new(Notify::new());

        LocalSet::new()
            .run_until(async {
                let server = tokio::task::spawn_local(run(
                    listener,
                    handler,
                    Arc::clone(&config),
                    Arc::clone(&shutdown),
                ));
                client(addr).await;
                shutdown.notify_one();
                server.await.unwrap();
            })
            .await;
    }

    /// Send one raw request and read until the server closes the connection
    async fn exchange(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn get(addr: SocketAddr, path: &str, extra: &str) -> String {
        exchange(
            addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{extra}Connection: close\r\n\r\n"),
        )
        .await
    }

    fn header_values<'a>(response: &'a str, name: &str) -> Vec<&'a str> {
        let head = response.split("\r\n\r\n").next().unwrap_or_default();
        head.lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .collect()
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<p>index</p>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1);").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_every_response_has_one_cors_header() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            for (path, status) in [
                ("/index.html", "200 OK"),
                ("/missing.txt", "404 Not Found"),
                ("/assets/", "200 OK"),
                ("/assets", "301 Moved Permanently"),
            ] {
                let response = get(addr, path, "").await;
                assert!(
                    response.starts_with(&format!("HTTP/1.1 {status}\r\n")),
                    "{path}: {response}"
                );
                assert_eq!(
                    header_values(&response, "access-control-allow-origin"),
                    vec!["*"],
                    "{path}"
                );
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_index_scenario() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            let response = get(addr, "/index.html", "Origin: http://localhost:3000\r\n").await;
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
            assert_eq!(
                header_values(&response, "content-type"),
                vec!["text/html; charset=utf-8"]
            );
            assert_eq!(header_values(&response, "access-control-allow-origin"), vec!["*"]);
            assert!(response.ends_with("\r\n\r\n<p>index</p>"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_directory_listing_scenario() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            let response = get(addr, "/assets/", "").await;
            assert!(response.contains("Directory listing for /assets/"));
            assert!(response.contains("<a href=\"app.js\">app.js</a>"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_unsupported_method_keeps_header() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            let response = exchange(
                addr,
                "DELETE /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            )
            .await;
            assert!(response.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
            assert_eq!(header_values(&response, "access-control-allow-origin"), vec!["*"]);
        })
        .await;
    }

    #[tokio::test]
    async fn test_cors_can_be_disabled() {
        let dir = site();
        let mut config = test_config(dir.path());
        config.cors.allow_any_origin = false;
        with_server(config, |addr| async move {
            let response = get(addr, "/index.html", "").await;
            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(header_values(&response, "access-control-allow-origin").is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn test_repeated_requests_identical() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            let strip_date = |response: String| {
                response
                    .lines()
                    .filter(|line| !line.to_ascii_lowercase().starts_with("date:"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let first = strip_date(get(addr, "/assets/app.js", "").await);
            let second = strip_date(get(addr, "/assets/app.js", "").await);
            assert_eq!(first, second);
        })
        .await;
    }

    #[tokio::test]
    async fn test_slow_reader_gets_whole_body() {
        const SIZE: usize = 8 << 20;
        let dir = site();
        std::fs::write(dir.path().join("big.bin"), vec![b'x'; SIZE]).unwrap();
        let mut config = test_config(dir.path());
        config.performance.connection_timeout = 1;

        with_server(config, |addr| async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /big.bin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            // stall well past the timeout while the server is mid-body
            tokio::time::sleep(Duration::from_millis(1500)).await;

            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            let body_start = buf
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|i| i + 4)
                .unwrap();
            assert!(buf.starts_with(b"HTTP/1.1 200 OK\r\n"));
            assert_eq!(buf.len() - body_start, SIZE);
        })
        .await;
    }

    #[tokio::test]
    async fn test_idle_connection_closed() {
        let dir = site();
        let mut config = test_config(dir.path());
        config.performance.connection_timeout = 1;

        with_server(config, |addr| async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut buf = Vec::new();
            let closed =
                tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut buf)).await;
            assert!(closed.is_ok(), "idle connection was not closed");
        })
        .await;
    }

    /// hyper answers unparseable requests itself, before any handler runs
    #[tokio::test]
    async fn test_malformed_request_has_no_cors_header() {
        let dir = site();
        with_server(test_config(dir.path()), |addr| async move {
            let response = exchange(addr, "GARBAGE\r\n\r\n").await;
            assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
            assert!(header_values(&response, "access-control-allow-origin").is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn test_connection_limit_rejects() {
        let dir = site();
        let mut config = test_config(dir.path());
        config.performance.max_connections = Some(0);
        with_server(config, |addr| async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let _ = stream
                .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await;
            let mut buf = Vec::new();
            let read = stream.read_to_end(&mut buf).await.unwrap_or(0);
            assert_eq!(read, 0);
        })
        .await;
    }
}
