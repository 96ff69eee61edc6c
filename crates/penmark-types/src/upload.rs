use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{PenmarkError, Result};

/// Suffix appended to the base name of every generated image.
pub const OUTPUT_SUFFIX: &str = "_handwritten.png";

/// Extensions offered by the file picker. Advisory only.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["txt", "pdf", "doc", "docx"];

/// Message shown for every transport or server failure.
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload file. Please try again.";
pub const NO_FILE_MESSAGE: &str = "Please select a file to upload.";
pub const IN_FLIGHT_MESSAGE: &str = "An upload is already in progress.";

/// A document chosen by the user, held fully in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads a local file; the name is the final path component.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let name = path_ref
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PenmarkError::Controller(format!("not a file path: {}", path_ref.display()))
            })?;
        let bytes = fs::read(path_ref).map_err(|err| {
            PenmarkError::Controller(format!("unable to read {}: {err}", path_ref.display()))
        })?;
        Ok(Self { name, bytes })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Computes the download name for the image generated from `name`.
///
/// Only the last extension segment is stripped, so `my.notes.txt` becomes
/// `my.notes_handwritten.png`. Names without an extension (including
/// dotfiles such as `.env`) keep their full text as the base.
pub fn derive_output_filename(name: &str) -> String {
    let file_name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let base = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{base}{OUTPUT_SUFFIX}")
}

pub fn is_accepted_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Failure categories an upload attempt can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum UploadErrorKind {
    #[error("no file selected")]
    NoFileSelected,
    #[error("upload already in flight")]
    AlreadyInFlight,
    #[error("transport or server error")]
    TransportOrServerError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {detail}")]
pub struct UploadFailure {
    pub kind: UploadErrorKind,
    /// Diagnostic text for logs; never shown to the user.
    pub detail: String,
}

impl UploadFailure {
    pub fn new(kind: UploadErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn no_file_selected() -> Self {
        Self::new(UploadErrorKind::NoFileSelected, "submit without a selected file")
    }

    pub fn already_in_flight() -> Self {
        Self::new(
            UploadErrorKind::AlreadyInFlight,
            "submit while a previous attempt is still pending",
        )
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::TransportOrServerError, detail)
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            UploadErrorKind::NoFileSelected => NO_FILE_MESSAGE,
            UploadErrorKind::AlreadyInFlight => IN_FLIGHT_MESSAGE,
            UploadErrorKind::TransportOrServerError => UPLOAD_FAILED_MESSAGE,
        }
    }
}
