//! Slip router stdio binary - main entry point.
//!
//! Reads inbound envelopes as JSON lines on stdin (`{"key":..,"envelope":..}`
//! or a bare envelope), routes them through an HTTP compute function, and
//! writes every send as a JSON line on stdout. Logs go to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use slip_router::function::HttpFunction;
use slip_router::transport::{Inbound, JsonLinesTransport};
use slip_router::{Config, Dispatcher};

#[derive(Debug, Parser)]
#[command(name = "slip-router", version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "SLIP_CONFIG")]
    config: Option<PathBuf>,

    /// Compute function endpoint (overrides config and SLIP_FUNCTION_URL).
    #[arg(long)]
    function_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env()?;
    if let Some(url) = args.function_url {
        config.function.url = Some(url);
    }
    config.validate()?;

    slip_router::observability::init_tracing(&config.observability);

    let function = HttpFunction::from_config(&config.function)?;
    tracing::info!(
        function = %function.url(),
        output = %config.destinations.default_output,
        "slip-router starting"
    );

    let config = Arc::new(config);
    let dispatcher = Dispatcher::new(
        config.clone(),
        Arc::new(JsonLinesTransport::stdout()),
        Arc::new(function),
    );

    let shutdown = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.engine.max_in_flight * 2);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            ctrl_c.cancel();
        }
    });

    let reader_shutdown = shutdown.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = reader_shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match Inbound::from_line(&line) {
                    Ok(inbound) => {
                        if tx.send(inbound).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping undecodable input line"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let summary = dispatcher.run(rx, shutdown).await?;
    reader.abort();

    tracing::info!(
        processed = summary.processed,
        aborted = summary.aborted,
        "slip-router finished"
    );

    Ok(())
}
