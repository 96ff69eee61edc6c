//! Upload/result lifecycle controller.
//!
//! The controller owns the selected document, drives exactly one request to
//! the [`UploadService`] per submit, and keeps the returned image alive as a
//! revocable [`BlobHandle`] until it is replaced or the controller is dropped.

pub mod blob;
pub mod preview;
pub mod sink;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use penmark_network::UploadService;
use penmark_ops::EventBus;
use penmark_types::{
    events::{DownloadEvent, SystemEvent, UploadEvent},
    upload::{derive_output_filename, is_accepted_extension, SelectedFile, UploadFailure},
    PenmarkError, Result,
};
use tracing::{info, warn};

pub use blob::{BlobHandle, BlobRegistry, BlobUrl};
pub use preview::{ImagePreview, Thumbnail};
pub use sink::{DirectoryDownloadSink, DownloadSink};

/// The image held after a successful attempt.
#[derive(Debug)]
pub struct ResultImage {
    pub handle: BlobHandle,
    pub preview: Option<ImagePreview>,
}

/// Lifecycle state; each variant carries only what is valid in it.
#[derive(Debug)]
pub enum UploadState {
    Idle,
    Submitting {
        attempt: u64,
        output_name: String,
    },
    Succeeded {
        output_name: String,
        image: ResultImage,
    },
    Failed {
        failure: UploadFailure,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadState::Idle => UploadPhase::Idle,
            UploadState::Submitting { .. } => UploadPhase::Submitting,
            UploadState::Succeeded { .. } => UploadPhase::Succeeded,
            UploadState::Failed { .. } => UploadPhase::Failed,
        }
    }
}

/// Summary of a held result, safe to hand to a renderer.
#[derive(Debug, Clone)]
pub struct ResultSummary {
    pub url: BlobUrl,
    pub bytes: usize,
    pub preview: Option<ImagePreview>,
}

/// Point-in-time view of the controller for rendering.
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub phase: UploadPhase,
    pub selected: Option<String>,
    pub selected_size: Option<usize>,
    pub is_loading: bool,
    /// Empty unless the last attempt failed.
    pub error_message: String,
    pub output_name: Option<String>,
    pub result: Option<ResultSummary>,
    pub attempts: u64,
}

struct ControllerInner {
    selected: Option<Arc<SelectedFile>>,
    state: UploadState,
    attempts: u64,
}

pub struct UploadController<S: UploadService> {
    service: S,
    registry: BlobRegistry,
    events: Option<EventBus>,
    inner: Mutex<ControllerInner>,
}

impl<S: UploadService> UploadController<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            registry: BlobRegistry::new(),
            events: None,
            inner: Mutex::new(ControllerInner {
                selected: None,
                state: UploadState::Idle,
                attempts: 0,
            }),
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_registry(mut self, registry: BlobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn registry(&self) -> &BlobRegistry {
        &self.registry
    }

    /// Replaces the selected document. State, result and error are kept.
    pub fn select_file(&self, file: SelectedFile) {
        if !is_accepted_extension(&file.name) {
            warn!(
                "'{}' is not a .txt/.pdf/.doc/.docx document; submitting anyway",
                file.name
            );
        }
        let event = UploadEvent::FileSelected {
            name: file.name.clone(),
            size: file.size(),
        };
        info!("Selected '{}' ({} bytes)", file.name, file.size());
        self.lock().selected = Some(Arc::new(file));
        self.publish(event);
    }

    /// Runs one upload attempt to completion.
    ///
    /// A submit while another attempt is pending is refused with
    /// `AlreadyInFlight` and leaves the pending attempt untouched. A submit
    /// with nothing selected fails without deriving a name or sending
    /// anything.
    pub async fn submit(&self) -> std::result::Result<(), UploadFailure> {
        let (attempt, file, output_name) = {
            let mut inner = self.lock();
            if let UploadState::Submitting { attempt, .. } = inner.state {
                drop(inner);
                let failure = UploadFailure::already_in_flight();
                warn!("Submit refused: attempt {} still pending", attempt);
                self.publish(UploadEvent::Rejected { kind: failure.kind });
                return Err(failure);
            }

            let Some(file) = inner.selected.clone() else {
                let failure = UploadFailure::no_file_selected();
                let previous = std::mem::replace(
                    &mut inner.state,
                    UploadState::Failed {
                        failure: failure.clone(),
                    },
                );
                drop(inner);
                drop(previous);
                warn!("Submit without a selected file");
                self.publish(UploadEvent::Failed {
                    attempt: None,
                    kind: failure.kind,
                    detail: failure.detail.clone(),
                });
                return Err(failure);
            };

            let output_name = derive_output_filename(&file.name);
            inner.attempts += 1;
            let attempt = inner.attempts;
            let previous = std::mem::replace(
                &mut inner.state,
                UploadState::Submitting {
                    attempt,
                    output_name: output_name.clone(),
                },
            );
            drop(inner);
            // Releases the superseded result handle, if any.
            drop(previous);
            (attempt, file, output_name)
        };

        info!(
            "Attempt {}: uploading '{}' -> '{}'",
            attempt, file.name, output_name
        );
        self.publish(UploadEvent::Started {
            attempt,
            file: file.name.clone(),
            output: output_name.clone(),
        });

        let mut guard = SettleGuard {
            inner: &self.inner,
            attempt,
            armed: true,
        };
        let outcome = self.service.upload(&file).await;
        guard.armed = false;

        match outcome {
            Ok(bytes) => {
                let size = bytes.len();
                let preview = ImagePreview::inspect(&bytes);
                let handle = self.registry.create(bytes);
                info!(
                    "Attempt {} succeeded: {} bytes at {}",
                    attempt,
                    size,
                    handle.url()
                );
                self.lock().state = UploadState::Succeeded {
                    output_name,
                    image: ResultImage { handle, preview },
                };
                self.publish(UploadEvent::Succeeded {
                    attempt,
                    bytes: size,
                });
                Ok(())
            }
            Err(err) => {
                let failure = UploadFailure::transport(err.detail);
                warn!("Attempt {} failed: {}", attempt, failure.detail);
                self.lock().state = UploadState::Failed {
                    failure: failure.clone(),
                };
                self.publish(UploadEvent::Failed {
                    attempt: Some(attempt),
                    kind: failure.kind,
                    detail: failure.detail.clone(),
                });
                Err(failure)
            }
        }
    }

    /// Saves the held image through `sink` under the derived name.
    ///
    /// Returns `Ok(None)` without side effects when no image is held.
    pub fn download(&self, sink: &dyn DownloadSink) -> Result<Option<PathBuf>> {
        let (filename, bytes) = {
            let inner = self.lock();
            match &inner.state {
                UploadState::Succeeded { output_name, image } => {
                    (output_name.clone(), image.handle.bytes())
                }
                _ => return Ok(None),
            }
        };
        let path = sink.save(&filename, &bytes)?;
        if let Some(bus) = &self.events {
            bus.publish(SystemEvent::download(DownloadEvent {
                filename,
                path: path.display().to_string(),
                bytes: bytes.len(),
            }));
        }
        Ok(Some(path))
    }

    pub fn phase(&self) -> UploadPhase {
        self.lock().state.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == UploadPhase::Submitting
    }

    pub fn error_message(&self) -> String {
        match &self.lock().state {
            UploadState::Failed { failure } => failure.user_message().to_string(),
            _ => String::new(),
        }
    }

    pub fn failure(&self) -> Option<UploadFailure> {
        match &self.lock().state {
            UploadState::Failed { failure } => Some(failure.clone()),
            _ => None,
        }
    }

    /// Bytes of the held image, if any.
    pub fn result_bytes(&self) -> Option<Arc<[u8]>> {
        match &self.lock().state {
            UploadState::Succeeded { image, .. } => Some(image.handle.bytes()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let inner = self.lock();
        let (error_message, output_name, result) = match &inner.state {
            UploadState::Idle => (String::new(), None, None),
            UploadState::Submitting { output_name, .. } => {
                (String::new(), Some(output_name.clone()), None)
            }
            UploadState::Succeeded { output_name, image } => (
                String::new(),
                Some(output_name.clone()),
                Some(ResultSummary {
                    url: image.handle.url(),
                    bytes: image.handle.len(),
                    preview: image.preview.clone(),
                }),
            ),
            UploadState::Failed { failure } => {
                (failure.user_message().to_string(), None, None)
            }
        };
        ControllerSnapshot {
            phase: inner.state.phase(),
            selected: inner.selected.as_ref().map(|f| f.name.clone()),
            selected_size: inner.selected.as_ref().map(|f| f.size()),
            is_loading: matches!(inner.state, UploadState::Submitting { .. }),
            error_message,
            output_name,
            result,
            attempts: inner.attempts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        lock_inner(&self.inner)
    }

    fn publish(&self, event: UploadEvent) {
        if let Some(bus) = &self.events {
            bus.publish(SystemEvent::upload(event));
        }
    }
}

fn lock_inner(inner: &Mutex<ControllerInner>) -> MutexGuard<'_, ControllerInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Leaves `Submitting` if the attempt future is dropped before it settles,
/// so the loading state can never outlive its request.
struct SettleGuard<'a> {
    inner: &'a Mutex<ControllerInner>,
    attempt: u64,
    armed: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock_inner(self.inner);
        if matches!(inner.state, UploadState::Submitting { attempt, .. } if attempt == self.attempt)
        {
            warn!("Attempt {} abandoned before completion", self.attempt);
            inner.state = UploadState::Failed {
                failure: UploadFailure::transport("upload abandoned before completion"),
            };
        }
    }
}

/// Generate an error aligned with controller semantics.
pub fn controller_error(message: impl Into<String>) -> PenmarkError {
    PenmarkError::Controller(message.into())
}
