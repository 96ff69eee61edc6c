//! Operational helpers: logging, the in-process event bus, event journaling.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};

use chrono::Utc;
use futures::{stream::BoxStream, StreamExt};
use penmark_types::{config::OpsConfig, events::SystemEvent, PenmarkError, Result};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    let installed = match &config.log_file {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| ops_error(format!("failed to open log file {path}: {err}")))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(StdMutex::new(file))
                .try_init()
        }
        None => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

/// In-process fan-out of [`SystemEvent`]s backed by a broadcast channel.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// is dropped, and slow subscribers skip what they lagged behind on.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: SystemEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

/// In-memory record of every event seen during a session.
#[derive(Clone, Default)]
pub struct EventJournal {
    events: Arc<Mutex<Vec<SystemEvent>>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: SystemEvent) {
        self.events.lock().await.push(event);
    }

    pub async fn snapshot(&self) -> Vec<SystemEvent> {
        self.events.lock().await.clone()
    }

    /// Writes the journal as JSON lines into `dir`, returning the file path.
    pub async fn write_json_lines<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = ensure_output_dir(dir)?;
        let path = dir.join(format!("events_{}.jsonl", Utc::now().format("%Y%m%d_%H%M%S")));
        let events = self.snapshot().await;

        let file = fs::File::create(&path)
            .map_err(|err| ops_error(format!("failed to create {}: {err}", path.display())))?;
        let mut writer = BufWriter::new(file);
        for event in &events {
            let line = serde_json::to_string(event)
                .map_err(|err| ops_error(format!("failed to encode event: {err}")))?;
            writeln!(writer, "{line}")
                .map_err(|err| ops_error(format!("failed to write journal: {err}")))?;
        }
        writer
            .flush()
            .map_err(|err| ops_error(format!("failed to flush journal: {err}")))?;
        info!("Wrote {} events to {:?}", events.len(), path);
        Ok(path)
    }
}

pub fn ensure_output_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let dir = path.as_ref().to_path_buf();
    fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create directory {:?}: {err}", dir)))?;
    info!("Output directory ready at {:?}", dir);
    Ok(dir)
}

pub fn ops_error(message: impl Into<String>) -> PenmarkError {
    PenmarkError::Ops(message.into())
}
