use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};
use voicetranscript_common::Result;

/// Writes uploads to uniquely named files under one directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `bytes` to a fresh `upload-*.<extension>` file.
    ///
    /// The file is created exclusively and removed when the returned
    /// [`Artifact`] is released or dropped.
    pub fn materialize(&self, bytes: &[u8], extension: &str) -> Result<Artifact> {
        let suffix = format!(".{}", extension);
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;

        file.write_all(bytes)?;
        file.flush()?;

        let temp = file.into_temp_path();
        let path = temp.to_path_buf();
        debug!("Materialized {} bytes to {}", bytes.len(), path.display());

        Ok(Artifact {
            temp: Some(temp),
            path,
            extension: extension.to_string(),
        })
    }
}

/// A request-owned temporary audio file
#[derive(Debug)]
pub struct Artifact {
    temp: Option<TempPath>,
    path: PathBuf,
    extension: String,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Delete the file. Safe to call more than once; a file that is already
    /// gone is not an error.
    pub fn release(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };

        match temp.close() {
            Ok(()) => debug!("Cleaned up temporary file: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up temp file {}: {}", self.path.display(), e),
        }
    }

    pub fn is_released(&self) -> bool {
        self.temp.is_none()
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_writes_unique_files() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(scratch.path());

        let a = store.materialize(b"RIFF....", "wav").unwrap();
        let b = store.materialize(b"RIFF....", "wav").unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"RIFF....");
        assert_eq!(a.extension(), "wav");

        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".wav"));
    }

    #[test]
    fn test_release_is_idempotent() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(scratch.path());

        let mut artifact = store.materialize(b"data", "mp3").unwrap();
        let path = artifact.path().to_path_buf();

        artifact.release();
        assert!(!path.exists());
        assert!(artifact.is_released());
        artifact.release();
    }

    #[test]
    fn test_release_tolerates_missing_file() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(scratch.path());

        let mut artifact = store.materialize(b"data", "ogg").unwrap();
        std::fs::remove_file(artifact.path()).unwrap();
        artifact.release();
        assert!(artifact.is_released());
    }

    #[test]
    fn test_drop_removes_file() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(scratch.path());

        let path = {
            let artifact = store.materialize(b"data", "flac").unwrap();
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_materialize_into_missing_dir_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(scratch.path().join("absent"));
        assert!(store.materialize(b"data", "wav").is_err());
    }
}
