use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use penmark_controller::{
    BlobRegistry, DirectoryDownloadSink, DownloadSink, UploadController, UploadPhase,
};
use penmark_network::{StaticUploadService, UploadService};
use penmark_ops::EventBus;
use penmark_types::{
    events::{EventPayload, UploadEvent},
    upload::{SelectedFile, UploadErrorKind, UploadFailure, UPLOAD_FAILED_MESSAGE},
    Result,
};
use tokio::sync::Notify;

const IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Collaborator that holds every request until released.
struct GatedService {
    release: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl GatedService {
    fn new() -> Self {
        Self {
            release: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UploadService for GatedService {
    async fn upload(&self, _file: &SelectedFile) -> Result<Vec<u8>, UploadFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.release.notified().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(IMAGE.to_vec())
    }

    async fn health(&self) -> Result<String> {
        Ok("gated".into())
    }
}

/// Collaborator replaying a fixed sequence of outcomes.
struct ScriptedService {
    outcomes: Mutex<VecDeque<Result<Vec<u8>, UploadFailure>>>,
}

impl ScriptedService {
    fn new(outcomes: Vec<Result<Vec<u8>, UploadFailure>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl UploadService for ScriptedService {
    async fn upload(&self, _file: &SelectedFile) -> Result<Vec<u8>, UploadFailure> {
        self.outcomes
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(UploadFailure::transport("script exhausted")))
    }

    async fn health(&self) -> Result<String> {
        Ok("scripted".into())
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().expect("sink lock").clone()
    }
}

impl DownloadSink for RecordingSink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.saved
            .lock()
            .expect("sink lock")
            .push((filename.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(filename))
    }
}

fn document(name: &str) -> SelectedFile {
    SelectedFile::new(name, b"document body".to_vec())
}

#[tokio::test]
async fn submit_without_file_fails_without_request() {
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()));

    let err = controller.submit().await.unwrap_err();

    assert_eq!(err.kind, UploadErrorKind::NoFileSelected);
    assert_eq!(controller.phase(), UploadPhase::Failed);
    assert_eq!(controller.service().calls(), 0);
    assert!(!controller.is_loading());
    assert!(controller.snapshot().output_name.is_none());
}

#[tokio::test]
async fn derived_filename_strips_last_extension_only() {
    for (input, expected) in [
        ("report.pdf", "report_handwritten.png"),
        ("my.notes.txt", "my.notes_handwritten.png"),
    ] {
        let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()));
        controller.select_file(document(input));
        controller.submit().await.expect("upload succeeds");
        assert_eq!(controller.snapshot().output_name.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn successful_submit_holds_returned_bytes() {
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()));
    controller.select_file(document("report.pdf"));

    controller.submit().await.expect("upload succeeds");

    assert_eq!(controller.phase(), UploadPhase::Succeeded);
    assert_eq!(controller.result_bytes().as_deref(), Some(IMAGE));
    assert!(!controller.is_loading());
    assert_eq!(controller.error_message(), "");
    let sent = controller.service().last_file().expect("request sent");
    assert_eq!(sent.name, "report.pdf");
    assert_eq!(sent.bytes, b"document body".to_vec());
}

#[tokio::test]
async fn server_error_reports_fixed_message() {
    let controller = UploadController::new(StaticUploadService::failing(
        UploadFailure::transport("service responded with HTTP 500 Internal Server Error"),
    ));
    controller.select_file(document("report.pdf"));

    let err = controller.submit().await.unwrap_err();

    assert_eq!(err.kind, UploadErrorKind::TransportOrServerError);
    assert_eq!(controller.phase(), UploadPhase::Failed);
    assert_eq!(controller.error_message(), UPLOAD_FAILED_MESSAGE);
    assert!(!controller.is_loading());
    assert!(controller.result_bytes().is_none());
}

#[tokio::test]
async fn second_submit_while_loading_is_rejected() {
    let controller = UploadController::new(GatedService::new());
    controller.select_file(document("report.pdf"));

    let first = controller.submit();
    let probe = async {
        tokio::task::yield_now().await;
        assert!(controller.is_loading());
        assert_eq!(controller.error_message(), "");
        assert!(controller.result_bytes().is_none());

        let second = controller.submit().await.unwrap_err();
        assert_eq!(second.kind, UploadErrorKind::AlreadyInFlight);
        assert!(controller.is_loading());
        assert_eq!(controller.service().in_flight.load(Ordering::SeqCst), 1);

        controller.service().release.notify_one();
    };
    let (first_result, ()) = tokio::join!(first, probe);

    first_result.expect("first attempt succeeds");
    assert!(!controller.is_loading());
    assert_eq!(controller.phase(), UploadPhase::Succeeded);
    assert_eq!(controller.service().calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.service().max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_without_result_is_noop() {
    let controller = UploadController::new(StaticUploadService::failing(
        UploadFailure::transport("refused"),
    ));
    let sink = RecordingSink::default();

    assert_eq!(controller.download(&sink).expect("download"), None);
    assert_eq!(controller.phase(), UploadPhase::Idle);

    controller.select_file(document("report.pdf"));
    let _ = controller.submit().await;
    assert_eq!(controller.download(&sink).expect("download"), None);
    assert_eq!(controller.phase(), UploadPhase::Failed);
    assert!(sink.saved().is_empty());
}

#[tokio::test]
async fn repeated_download_saves_identical_copies() {
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()));
    controller.select_file(document("report.pdf"));
    controller.submit().await.expect("upload succeeds");
    let before = controller.snapshot();
    let sink = RecordingSink::default();

    controller.download(&sink).expect("first download");
    controller.download(&sink).expect("second download");

    let saved = sink.saved();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0], saved[1]);
    assert_eq!(saved[0].0, "report_handwritten.png");
    assert_eq!(saved[0].1, IMAGE.to_vec());

    let after = controller.snapshot();
    assert_eq!(after.phase, UploadPhase::Succeeded);
    assert_eq!(after.attempts, before.attempts);
    assert_eq!(
        after.result.map(|r| r.url),
        before.result.map(|r| r.url)
    );
}

#[tokio::test]
async fn superseded_and_final_handles_are_released() {
    let registry = BlobRegistry::new();
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()))
        .with_registry(registry.clone());
    controller.select_file(document("report.pdf"));

    controller.submit().await.expect("first upload");
    let first_url = controller.snapshot().result.expect("result").url;
    assert_eq!(registry.live_count(), 1);

    controller.submit().await.expect("second upload");
    let second_url = controller.snapshot().result.expect("result").url;
    assert_ne!(first_url, second_url);
    assert_eq!(registry.live_count(), 1);
    assert!(registry.resolve(&first_url).is_none());
    assert!(registry.resolve(&second_url).is_some());

    drop(controller);
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn failed_resubmit_clears_previous_result() {
    let registry = BlobRegistry::new();
    let service = ScriptedService::new(vec![
        Ok(IMAGE.to_vec()),
        Err(UploadFailure::transport("HTTP 502")),
    ]);
    let controller = UploadController::new(service).with_registry(registry.clone());
    controller.select_file(document("report.pdf"));
    controller.submit().await.expect("first upload succeeds");

    controller.select_file(document("next.docx"));
    assert_eq!(controller.phase(), UploadPhase::Succeeded);
    assert!(controller.result_bytes().is_some());

    let err = controller.submit().await.unwrap_err();
    assert_eq!(err.kind, UploadErrorKind::TransportOrServerError);
    assert!(controller.result_bytes().is_none());
    assert_eq!(registry.live_count(), 0);
    assert_eq!(controller.error_message(), UPLOAD_FAILED_MESSAGE);
}

#[tokio::test]
async fn lifecycle_events_are_published_in_order() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()))
        .with_events(bus.clone());

    controller.select_file(document("report.pdf"));
    controller.submit().await.expect("upload succeeds");

    let mut seen = Vec::new();
    for _ in 0..3 {
        match events.next().await.expect("event").payload {
            EventPayload::Upload(event) => seen.push(event),
            other => panic!("unexpected payload {other:?}"),
        }
    }
    assert_eq!(
        seen,
        vec![
            UploadEvent::FileSelected {
                name: "report.pdf".into(),
                size: 13,
            },
            UploadEvent::Started {
                attempt: 1,
                file: "report.pdf".into(),
                output: "report_handwritten.png".into(),
            },
            UploadEvent::Succeeded {
                attempt: 1,
                bytes: IMAGE.len(),
            },
        ]
    );
}

#[tokio::test]
async fn download_writes_into_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = DirectoryDownloadSink::new(dir.path().join("downloads"));
    let controller = UploadController::new(StaticUploadService::succeeding(IMAGE.to_vec()));
    controller.select_file(document("letter.docx"));
    controller.submit().await.expect("upload succeeds");

    let path = controller
        .download(&sink)
        .expect("download")
        .expect("image held");
    assert_eq!(path, dir.path().join("downloads/letter_handwritten.png"));
    assert_eq!(std::fs::read(path).expect("read back"), IMAGE.to_vec());
}
