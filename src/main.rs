use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;

mod cli;
mod config;
mod error;
mod handler;
mod http;
mod logger;
mod server;

use crate::cli::Cli;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{Cors, StaticFiles};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logger::log_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), ServerError> {
    let cfg = ServerConfig::load(cli)?;
    logger::init(&cfg).map_err(ServerError::Logger)?;

    // Worker threads serve blocking file I/O; connections run on a LocalSet
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build().map_err(ServerError::Runtime)?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: ServerConfig) -> Result<(), ServerError> {
    let addr = cfg.socket_addr()?;
    let files = StaticFiles::new(&cfg.server.root, &cfg.http)?;
    let handler = Arc::new(Cors::new(files, cfg.cors.allow_any_origin));

    let listener =
        server::bind_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr().unwrap_or(addr);

    let shutdown = Arc::new(Notify::new());
    server::signal::start_signal_handler(Arc::clone(&shutdown)).map_err(ServerError::Runtime)?;

    logger::log_server_start(&local_addr, &cfg);

    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::run(listener, handler, Arc::new(cfg), shutdown))
        .await;
    Ok(())
}
