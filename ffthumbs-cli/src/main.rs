mod cli;
mod commands;
mod config;

use std::process;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::config::FileConfig;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let file = FileConfig::load(args.config.as_deref())?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping ffmpeg");
                cancel.cancel();
            }
        });
    }

    match &args.command {
        Commands::Thumbs(thumbs) => commands::thumbs(&args, thumbs, file.thumbs, cancel).await,
        Commands::Screens(screens) => {
            commands::screens(&args, screens, file.screens, cancel).await
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("ffthumbs=debug,process_utils=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ffthumbs=info,process_utils=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose).with_writer(std::io::stderr))
        .init();
}
