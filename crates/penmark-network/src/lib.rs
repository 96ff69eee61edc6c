//! Client side of the remote handwriting-image service.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use penmark_types::{
    config::ServiceConfig,
    upload::{SelectedFile, UploadFailure},
    PenmarkError, Result,
};
use reqwest::{multipart, Client};
use tokio::time::sleep;
use tracing::{debug, info};

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Sends one document and returns the generated image bytes.
    ///
    /// Every failure is reported as a transport/server failure; callers get
    /// a diagnostic detail but no finer classification.
    async fn upload(&self, file: &SelectedFile) -> Result<Vec<u8>, UploadFailure>;

    /// Liveness probe against the service root.
    async fn health(&self) -> Result<String>;
}

/// Talks to the real service over HTTP.
pub struct HttpUploadService {
    client: Client,
    upload_url: String,
    health_url: String,
}

impl HttpUploadService {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| network_error(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            upload_url: config.upload_url(),
            health_url: config.health_url(),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn upload(&self, file: &SelectedFile) -> Result<Vec<u8>, UploadFailure> {
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = multipart::Form::new().part(FILE_FIELD, part);

        info!(
            "POST {} ({} bytes, '{}')",
            self.upload_url,
            file.size(),
            file.name
        );
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadFailure::transport(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadFailure::transport(format!(
                "service responded with HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| UploadFailure::transport(format!("failed to read response: {err}")))?;
        debug!("Received {} response bytes", body.len());
        Ok(body.to_vec())
    }

    async fn health(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|err| network_error(format!("health check failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network_error(format!(
                "health check returned HTTP {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|err| network_error(format!("failed to read health response: {err}")))
    }
}

/// In-process collaborator answering every upload with the same outcome.
pub struct StaticUploadService {
    outcome: Result<Vec<u8>, UploadFailure>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_file: Mutex<Option<SelectedFile>>,
}

impl StaticUploadService {
    pub fn succeeding(image: Vec<u8>) -> Self {
        Self::with_outcome(Ok(image))
    }

    pub fn failing(failure: UploadFailure) -> Self {
        Self::with_outcome(Err(failure))
    }

    fn with_outcome(outcome: Result<Vec<u8>, UploadFailure>) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            last_file: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_file(&self) -> Option<SelectedFile> {
        self.last_file.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl UploadService for StaticUploadService {
    async fn upload(&self, file: &SelectedFile) -> Result<Vec<u8>, UploadFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_file.lock() {
            *guard = Some(file.clone());
        }
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.outcome.clone()
    }

    async fn health(&self) -> Result<String> {
        Ok("static upload service".into())
    }
}

pub fn network_error(message: impl Into<String>) -> PenmarkError {
    PenmarkError::Network(message.into())
}
