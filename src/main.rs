//! remote-temperature - polls remote sensors for a dashboard display
//!
//! Reads display messages as JSON lines on stdin and writes pushes as JSON
//! lines on stdout. Logs go to stderr.

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remote_temperature::aggregator::{Aggregator, FetchSettings};
use remote_temperature::cli::Cli;
use remote_temperature::config::InitConfig;
use remote_temperature::notify::{Inbound, Outbound};
use remote_temperature::refresh::{run_once, SchedulerHandle};

/// Sets up logging to stderr, filtered by `RUST_LOG`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("remote_temperature=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Writes pushes to stdout, one JSON object per line
fn spawn_writer(mut rx: mpsc::Receiver<Outbound>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "failed to serialize push");
                    continue;
                }
            };
            let mut stdout = std::io::stdout().lock();
            if writeln!(stdout, "{}", line).and_then(|_| stdout.flush()).is_err() {
                warn!("stdout closed, stopping writer");
                break;
            }
        }
    })
}

fn parse_inbound(line: &str) -> Option<Inbound> {
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "ignoring malformed inbound message");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}

/// Applies CLI overrides to an Init read from stdin; a bad one is logged, not fatal
fn accept_init(cli: &Cli, config: InitConfig) -> Option<InitConfig> {
    match cli.apply_overrides(config) {
        Ok(config) => Some(config),
        Err(e) => {
            error!(error = %e, "ignoring invalid Init");
            None
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (out_tx, out_rx) = mpsc::channel(32);
    let writer = spawn_writer(out_rx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // With --config the Init comes from the file, otherwise from stdin
    let file_config = match &cli.config {
        Some(path) => Some(cli.apply_overrides(InitConfig::from_path(path)?)?),
        None => None,
    };

    if cli.once {
        let config = match file_config {
            Some(config) => config,
            None => loop {
                let Some(line) = lines.next_line().await? else {
                    return Err("stdin closed before Init".into());
                };
                let Some(Inbound::Init(config)) = parse_inbound(&line) else {
                    continue;
                };
                let Some(config) = accept_init(&cli, config) else {
                    continue;
                };
                match config.into_sources() {
                    Ok(_) => break config,
                    Err(e) => error!(error = %e, "ignoring invalid Init"),
                }
            },
        };
        let sources = config.into_sources()?;
        let aggregator = Aggregator::new(FetchSettings {
            ttls: config.cache_ttls(),
            ..FetchSettings::default()
        });
        run_once(&aggregator, &sources, config.units, out_tx).await;
        writer.await?;
        return Ok(());
    }

    let scheduler = SchedulerHandle::spawn(FetchSettings::default(), out_tx);
    // With a config file the display channel is optional, so EOF only stops reading
    let keep_running_on_eof = file_config.is_some();
    if let Some(config) = file_config {
        scheduler.send(Inbound::Init(config)).await;
    }

    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let message = match parse_inbound(&line) {
                            Some(Inbound::Init(config)) => match accept_init(&cli, config) {
                                Some(config) => Inbound::Init(config),
                                None => continue,
                            },
                            Some(message) => message,
                            None => continue,
                        };
                        scheduler.send(message).await;
                    }
                    None if keep_running_on_eof => {
                        info!("stdin closed, polling continues until interrupted");
                        stdin_open = false;
                    }
                    None => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    writer.await?;
    Ok(())
}
