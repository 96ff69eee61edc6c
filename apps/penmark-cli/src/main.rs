mod ui;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use penmark_controller::{DirectoryDownloadSink, UploadController};
use penmark_network::{HttpUploadService, UploadService};
use penmark_ops::{init_tracing, EventBus, EventJournal};
use penmark_types::{
    config::PenmarkConfig,
    events::{LifecyclePhase, SystemEvent},
    upload::SelectedFile,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ui::{UiCommand, UiMessage};

const DEFAULT_CONFIG: &str = "configs/dev.toml";
const EVENT_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "penmark", version, about = "Turn documents into handwriting images")]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(short, long, env = "PENMARK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal interface (default).
    Tui,
    /// Upload one document and report the outcome.
    Upload {
        file: PathBuf,
        /// Save the generated image into the download directory.
        #[arg(short, long)]
        download: bool,
    },
    /// Probe the service's root route.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => {
            // The alternate screen owns the terminal; only log to a file.
            if config.ops.log_file.is_some() {
                init_tracing(&config.ops)?;
            }
            run_tui(config).await
        }
        Command::Upload { file, download } => {
            init_tracing(&config.ops)?;
            run_upload(&config, file, download).await
        }
        Command::Health => {
            init_tracing(&config.ops)?;
            let service = HttpUploadService::new(&config.service)?;
            let banner = service.health().await?;
            println!("{}: {}", config.service.health_url(), banner.trim());
            Ok(())
        }
    }
}

fn load_config(from_args: Option<PathBuf>) -> PenmarkConfig {
    let path = from_args.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    match PenmarkConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                PenmarkConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            PenmarkConfig::default()
        }
    }
}

async fn run_upload(config: &PenmarkConfig, file: PathBuf, download: bool) -> Result<()> {
    let service = HttpUploadService::new(&config.service)?;
    let controller = UploadController::new(service);
    controller.select_file(SelectedFile::from_path(&file)?);

    if let Err(failure) = controller.submit().await {
        eprintln!("{}", failure.user_message());
        return Err(anyhow!(failure));
    }

    let snapshot = controller.snapshot();
    let output = snapshot.output_name.unwrap_or_default();
    match snapshot.result {
        Some(result) => match result.preview {
            Some(preview) => println!(
                "Received {} ({}x{} {:?}, {} bytes)",
                output, preview.width, preview.height, preview.format, result.bytes
            ),
            None => println!("Received {} ({} bytes)", output, result.bytes),
        },
        None => println!("Received {}", output),
    }

    if download {
        let sink = DirectoryDownloadSink::from_config(&config.output);
        if let Some(path) = controller.download(&sink)? {
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

async fn run_tui(config: PenmarkConfig) -> Result<()> {
    let bus = EventBus::new(EVENT_CAPACITY);
    let journal = EventJournal::new();
    let service = HttpUploadService::new(&config.service)?;
    let controller = Arc::new(UploadController::new(service).with_events(bus.clone()));
    let sink = DirectoryDownloadSink::from_config(&config.output);

    let (ui_tx, ui_rx) = std::sync::mpsc::channel::<UiMessage>();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let mut events = bus.subscribe();
    let forward_tx = ui_tx.clone();
    let forward_journal = journal.clone();
    let forward_controller = controller.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            forward_journal.record(event.clone()).await;
            if forward_tx.send(UiMessage::Event(event)).is_err() {
                break;
            }
            let _ = forward_tx.send(UiMessage::State(forward_controller.snapshot()));
        }
    });

    bus.publish(SystemEvent::lifecycle(
        LifecyclePhase::Boot,
        format!("target {}", config.service.upload_url()),
    ));

    let health_tx = ui_tx.clone();
    let health_controller = controller.clone();
    tokio::spawn(async move {
        let notice = match health_controller.service().health().await {
            Ok(_) => "Service reachable".to_string(),
            Err(err) => format!("Service not reachable yet: {err}"),
        };
        let _ = health_tx.send(UiMessage::Notice(notice));
    });

    let summary = format!(
        "{} -> {}",
        config.service.upload_url(),
        config.output.download_dir
    );
    let _ = ui_tx.send(UiMessage::State(controller.snapshot()));
    let ui_handle = tokio::task::spawn_blocking(move || ui::run(ui_rx, cmd_tx, summary));

    while let Some(command) = cmd_rx.recv().await {
        match command {
            UiCommand::Select(path) => match SelectedFile::from_path(&path) {
                Ok(file) => controller.select_file(file),
                Err(err) => {
                    warn!("File selection failed: {err}");
                    let _ = ui_tx.send(UiMessage::Notice(err.to_string()));
                }
            },
            UiCommand::Submit => {
                let controller = controller.clone();
                // The outcome reaches the UI through the event bus.
                tokio::spawn(async move {
                    let _ = controller.submit().await;
                });
            }
            UiCommand::Download => match controller.download(&sink) {
                Ok(Some(path)) => {
                    let _ = ui_tx.send(UiMessage::Notice(format!("Saved {}", path.display())));
                }
                Ok(None) => {
                    let _ = ui_tx.send(UiMessage::Notice("No image to download yet".into()));
                }
                Err(err) => {
                    warn!("Download failed: {err}");
                    let _ = ui_tx.send(UiMessage::Notice(err.to_string()));
                }
            },
            UiCommand::Quit => break,
        }
        let _ = ui_tx.send(UiMessage::State(controller.snapshot()));
    }

    let _ = ui_tx.send(UiMessage::Shutdown);
    drop(ui_tx);
    ui_handle.await??;

    journal
        .record(SystemEvent::lifecycle(
            LifecyclePhase::Shutdown,
            "terminal closed",
        ))
        .await;
    if let Some(dir) = &config.ops.journal_dir {
        let path = journal.write_json_lines(dir).await?;
        info!("Session journal written to {:?}", path);
    }
    Ok(())
}
