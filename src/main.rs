//! OFT Bridge - omnichain token pathway configuration and transfers
//!
//! Declares the security stack and enforced options of every pathway between
//! the configured networks, and quotes and sends tokens along them.

use clap::Parser;
use tracing::{error, info};

mod address;
mod chain;
mod cli;
mod config;
mod error;
mod graph;
mod oft;
mod options;
mod registry;
mod tx;

use cli::Cli;
use oft::{StageError, TransferStage};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    info!("Starting OFT Bridge v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::run(cli).await {
        match e.downcast_ref::<StageError>() {
            Some(failure) => {
                error!(
                    stage = %failure.stage,
                    category = ?failure.error.category(),
                    "Transfer failed at {}: {}",
                    failure.stage,
                    failure.error
                );
                if failure.error.is_transient() && failure.stage != TransferStage::Submit {
                    info!("Nothing was submitted; the transfer can be retried");
                }
            }
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,oft_bridge=debug"));

    // Command output goes to stdout, logs to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
