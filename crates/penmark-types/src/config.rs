use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{PenmarkError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Request timeout. Absent means wait for the service indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub download_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    /// Log destination. Unset means stderr.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Directory receiving a JSON-lines event journal on shutdown.
    #[serde(default)]
    pub journal_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenmarkConfig {
    pub service: ServiceConfig,
    pub output: OutputConfig,
    pub ops: OpsConfig,
}

fn default_upload_path() -> String {
    "/upload".into()
}

fn default_health_path() -> String {
    "/".into()
}

impl ServiceConfig {
    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.upload_path)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

impl Default for PenmarkConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                base_url: "http://127.0.0.1:5000".into(),
                upload_path: default_upload_path(),
                health_path: default_health_path(),
                timeout_ms: None,
            },
            output: OutputConfig {
                download_dir: "downloads".into(),
            },
            ops: OpsConfig {
                log_level: "info".into(),
                log_file: None,
                journal_dir: None,
            },
        }
    }
}

impl PenmarkConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PenmarkError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PenmarkError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.service.base_url.trim();
        if base.is_empty() {
            return Err(PenmarkError::Configuration(
                "service.base_url must not be empty".into(),
            ));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(PenmarkError::Configuration(format!(
                "service.base_url must be an http(s) address, got '{base}'"
            )));
        }
        if !self.service.upload_path.starts_with('/') {
            return Err(PenmarkError::Configuration(
                "service.upload_path must start with '/'".into(),
            ));
        }
        if !self.service.health_path.starts_with('/') {
            return Err(PenmarkError::Configuration(
                "service.health_path must start with '/'".into(),
            ));
        }
        if self.service.timeout_ms == Some(0) {
            return Err(PenmarkError::Configuration(
                "service.timeout_ms must be greater than zero when set".into(),
            ));
        }
        if self.output.download_dir.trim().is_empty() {
            return Err(PenmarkError::Configuration(
                "output.download_dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}
