// Configuration module entry point
// Layers defaults, an optional config file, environment and CLI overrides

pub mod types;

use std::net::SocketAddr;

use crate::cli::Cli;
use crate::error::ServerError;

pub use types::{HttpConfig, ServerConfig};

/// Environment variable prefix, e.g. `CORS_SERVER__SERVER__PORT=9000`
const ENV_PREFIX: &str = "CORS_SERVER";

impl ServerConfig {
    /// Load configuration for the given command line.
    ///
    /// Precedence, lowest first: built-in defaults, config file, environment, CLI.
    pub fn load(cli: &Cli) -> Result<Self, ServerError> {
        Self::load_with_env(cli, None)
    }

    /// Load with an explicit environment map instead of the process environment
    fn load_with_env(
        cli: &Cli,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ServerError> {
        let root = cli
            .directory
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned());

        let settings = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.root", ".")?
            .set_default("cors.allow_any_origin", true)?
            .set_default(
                "http.server_name",
                concat!("cors_static_server/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("http.index_files", vec!["index.html", "index.htm"])?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "common")?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 60_i64)?
            .add_source(config::File::with_name(&cli.config).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(env),
            )
            .set_override_option("server.port", cli.port.map(i64::from))?
            .set_override_option("server.host", cli.bind.clone())?
            .set_override_option("server.root", root)?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let host = self.server.host.trim_start_matches('[').trim_end_matches(']');
        let addr = if host.contains(':') {
            format!("[{host}]:{}", self.server.port)
        } else {
            format!("{host}:{}", self.server.port)
        };
        addr.parse()
            .map_err(|e| ServerError::InvalidAddress(format!("{addr}: {e}")))
    }
}
