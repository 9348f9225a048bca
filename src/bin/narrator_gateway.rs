//! narrator_gateway - inference gateway for narrator clients
//!
//! This daemon:
//! 1. Loads backend settings from NARRATOR_GATEWAY_CONFIG and the environment
//! 2. Serves /caption/{lang}, /ocr/{lang} and /traffic
//! 3. Degrades to placeholder results when a backend is missing or failing

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_narrator::config::GatewayConfig;
use frame_narrator::{BackendRegistry, GatewayRouter, GatewayServer, InferencePipeline};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Caption, OCR and traffic-scene gateway with graceful degradation"
)]
struct Args {
    /// Listen address.
    #[arg(long, env = "NARRATOR_GATEWAY_ADDR")]
    addr: Option<String>,

    /// Base URL shown in usage examples.
    #[arg(long, env = "NARRATOR_PUBLIC_URL")]
    public_url: Option<String>,

    /// Initialize every backend before accepting requests.
    #[arg(long)]
    warm_up: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = GatewayConfig::load()?;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }

    let registry = Arc::new(BackendRegistry::from_settings(&config.backends));
    if args.warm_up {
        log::info!("warming up backends");
        registry.warm_up();
    }

    let public_url = args
        .public_url
        .unwrap_or_else(|| format!("http://{}", config.addr));
    let router = GatewayRouter::new(InferencePipeline::new(registry)).with_public_url(public_url);
    let handle = GatewayServer::new(config.addr.clone(), router).spawn()?;
    log::info!("narrator_gateway running on {}", handle.addr);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("narrator_gateway waiting for shutdown signal (Ctrl-C)...");
    handle.wait(&shutdown)?;
    log::info!("narrator_gateway stopped");
    Ok(())
}
