use std::net::ToSocketAddrs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{info, LevelFilter};

use bottle_measure::config::Config;
use bottle_measure::recognition::engine::Engine;
use bottle_measure::server;

/// Estimate bottle size and volume from a photo over HTTP
#[derive(Parser, Debug)]
#[command(name = "bottle_measure")]
#[command(about = "Bottle dimension and volume estimation service", long_about = None)]
struct Args {
    /// YAML config file, built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG 优先
    let level = log_level(args.verbose, args.quiet);
    Builder::from_env(Env::default().default_filter_or(level.as_str())).init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = (config.server.host.as_str(), config.server.port)
        .to_socket_addrs()
        .with_context(|| format!("resolve {}:{}", config.server.host, config.server.port))?
        .next()
        .with_context(|| format!("no address for {}", config.server.host))?;

    info!(
        "scale mode {:?}, tolerance {}%, {} bottle specs",
        config.scale.mode,
        config.classification.tolerance_percent,
        config.classification.bottle_specs.len()
    );
    let engine = Arc::new(Engine::new(config)?);
    info!("detector: {} on {}", engine.detector().method(), engine.detector().device());

    server::serve(engine, addr, shutdown_signal()).await
}
