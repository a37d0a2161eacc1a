use std::path::PathBuf;

use anyhow::Result;
use beacon_ranger_lib::config::{AppConfig, CONFIG_FILE_NAME};
use beacon_ranger_lib::core::ObservationSource;
use beacon_ranger_lib::core::beacon::{LogPublisher, SnapshotReceiver, WatchPublisher};
use beacon_ranger_lib::core::bluetooth::BeaconScanner;
use beacon_ranger_lib::logging;
use beacon_ranger_lib::replay::{Recording, Replay};
use beacon_ranger_lib::state::AppState;
use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info, warn};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "beacon-ranger")]
#[command(version)]
#[command(about = "Ranges nearby iBeacons and keeps a live list of the ones in range", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Print each published snapshot to stdout as a line of JSON instead of logging it
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Range beacons with the host Bluetooth adapter until interrupted
    Scan,
    /// Feed a recorded session through the engine
    Replay {
        /// JSON recording of scan cycles
        recording: PathBuf,
    },
    /// Write the default configuration to the config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let recording_path = match cli.command {
        Commands::InitConfig => {
            AppConfig::default().save_config(&cli.config).await?;
            return Ok(());
        }
        Commands::Scan => None,
        Commands::Replay { recording } => Some(recording),
    };

    let config = AppConfig::load_config(&cli.config).await?;
    let (mut state, display) = if cli.json {
        let (publisher, receiver) = WatchPublisher::new();
        let state = AppState::new(config, publisher)?;
        (state, Some(tokio::spawn(print_snapshots(receiver))))
    } else {
        (AppState::new(config, LogPublisher::new())?, None)
    };

    let cancel_token = CancellationToken::new();
    let cancel_on_signal = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping.");
            cancel_on_signal.cancel();
        }
    });

    let source = open_source_until_cancelled(&state, recording_path, &cancel_token).await;

    let result = match source {
        Some(Ok(mut source)) => source.run(state.sender(), cancel_token).await,
        Some(Err(e)) => Err(e),
        None => Ok(()),
    };
    if let Err(e) = &result {
        error!("Ranging stopped with an error: {}", e);
    }

    state.ranging_manager.shutdown().await?;
    drop(state);
    if let Some(display) = display {
        if let Err(e) = display.await {
            warn!("Display task failed: {}", e);
        }
    }
    result
}

/// Opens the source unless cancelled first; opening the adapter can wait
/// indefinitely for it to power on
async fn open_source_until_cancelled(
    state: &AppState,
    recording_path: Option<PathBuf>,
    cancel_token: &CancellationToken,
) -> Option<Result<Box<dyn ObservationSource + Send>>> {
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            info!("Cancelled before ranging started.");
            None
        }
        source = open_source(state, recording_path) => Some(source),
    }
}

async fn open_source(state: &AppState, recording_path: Option<PathBuf>) -> Result<Box<dyn ObservationSource + Send>> {
    let source: Box<dyn ObservationSource + Send> = match recording_path {
        None => Box::new(
            BeaconScanner::with_default_adapter(
                state.regions.clone(),
                state.config.estimator.estimator(),
                state.config.scanner.clone(),
            )
            .await?,
        ),
        Some(recording) => {
            let recording = Recording::load(&recording).await?;
            Box::new(Replay::new(recording, state.regions.clone()))
        }
    };
    Ok(source)
}

/// Writes every published snapshot to stdout as one JSON line
async fn print_snapshots(receiver: SnapshotReceiver) {
    let SnapshotReceiver {
        mut snapshots,
        mut failures,
    } = receiver;
    let mut failures_open = true;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = serde_json::to_string(&*snapshots.borrow_and_update());
                match line {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize snapshot: {}", e),
                }
            }
            failure = failures.recv(), if failures_open => {
                match failure {
                    Some(failure) => match serde_json::to_string(&failure) {
                        Ok(line) => eprintln!("{}", line),
                        Err(e) => warn!("Failed to serialize ranging failure: {}", e),
                    },
                    None => failures_open = false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = r#"{ "cycles": [] }"#;

    #[tokio::test]
    async fn test_cancelled_before_source_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.json");
        tokio::fs::write(&path, RECORDING).await.unwrap();
        let mut state = AppState::new(AppConfig::default(), LogPublisher::new()).unwrap();

        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        assert!(
            open_source_until_cancelled(&state, Some(path.clone()), &cancel_token)
                .await
                .is_none()
        );

        let source = open_source_until_cancelled(&state, Some(path), &CancellationToken::new()).await;
        assert!(matches!(source, Some(Ok(_))));

        let missing = dir.path().join("missing.json");
        let source = open_source_until_cancelled(&state, Some(missing), &CancellationToken::new()).await;
        assert!(matches!(source, Some(Err(_))));

        state.ranging_manager.shutdown().await.unwrap();
    }
}
