use std::{
    fs,
    path::{Path, PathBuf},
};

use penmark_types::{config::OutputConfig, Result};
use tracing::info;

use crate::controller_error;

/// Destination for a "save as" of the generated image.
pub trait DownloadSink: Send + Sync {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Saves downloads into a fixed directory, overwriting same-named files.
pub struct DirectoryDownloadSink {
    dir: PathBuf,
}

impl DirectoryDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.download_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectoryDownloadSink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        // Never let a derived name escape the download directory.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| controller_error(format!("invalid download name '{filename}'")))?;
        fs::create_dir_all(&self.dir).map_err(|err| {
            controller_error(format!(
                "failed to create download dir {}: {err}",
                self.dir.display()
            ))
        })?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)
            .map_err(|err| controller_error(format!("failed to write {}: {err}", path.display())))?;
        info!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_into_nested_missing_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let sink = DirectoryDownloadSink::new(root.path().join("a/b"));
        let path = sink
            .save("report_handwritten.png", b"png")
            .expect("save succeeds");
        assert_eq!(path, root.path().join("a/b/report_handwritten.png"));
        assert_eq!(fs::read(path).expect("read back"), b"png");
    }

    #[test]
    fn strips_directory_components_from_name() {
        let root = tempfile::tempdir().expect("tempdir");
        let sink = DirectoryDownloadSink::new(root.path());
        let path = sink.save("../escape.png", b"x").expect("save succeeds");
        assert_eq!(path, root.path().join("escape.png"));
    }
}
