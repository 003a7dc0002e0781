//! Command-line interface
//!
//! Mirrors the usual `python -m http.server` surface: an optional positional
//! port plus `--bind` and `--directory`. Anything given here overrides the
//! config file and environment.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cors_static_server")]
#[command(
    version,
    about = "Serve a directory over HTTP with Access-Control-Allow-Origin: *",
    long_about = None
)]
pub struct Cli {
    /// Port to listen on [default: 8000]
    pub port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(short, long, value_name = "ADDRESS")]
    pub bind: Option<String>,

    /// Directory to serve [default: current directory]
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Config file, with or without extension
    #[arg(short, long, value_name = "FILE", default_value = "cors_server")]
    pub config: String,
}
