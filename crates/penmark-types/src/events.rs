use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::upload::UploadErrorKind;

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Upload,
    Download,
}

/// Immutable event envelope for logging and the terminal event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Upload(UploadEvent),
    Download(DownloadEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    Ready,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadEvent {
    FileSelected {
        name: String,
        size: usize,
    },
    Started {
        attempt: u64,
        file: String,
        output: String,
    },
    Succeeded {
        attempt: u64,
        bytes: usize,
    },
    Failed {
        attempt: Option<u64>,
        kind: UploadErrorKind,
        detail: String,
    },
    /// A submit refused without touching the in-flight attempt.
    Rejected {
        kind: UploadErrorKind,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub filename: String,
    pub path: String,
    pub bytes: usize,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(phase: LifecyclePhase, details: impl Into<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase,
                details: Some(details.into()),
            }),
        )
    }

    pub fn upload(event: UploadEvent) -> Self {
        Self::new(EventKind::Upload, EventPayload::Upload(event))
    }

    pub fn download(event: DownloadEvent) -> Self {
        Self::new(EventKind::Download, EventPayload::Download(event))
    }
}
