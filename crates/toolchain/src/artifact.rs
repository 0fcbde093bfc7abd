//! Temporary file artifacts with scoped ownership.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file inside its own temporary directory.
///
/// Compiled objects, transformed modules and scratch executables each get
/// one of these; dropping the artifact removes the directory, so every exit
/// path of a task releases what it created.
#[derive(Debug)]
pub struct TempArtifact {
    _dir: TempDir,
    path: PathBuf,
}

impl TempArtifact {
    /// Reserve a fresh artifact path. The file itself is created by
    /// whichever tool writes to it.
    pub fn new() -> io::Result<Self> {
        Self::with_name("artifact")
    }

    pub fn with_name(name: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("looptune").tempdir()?;
        let path = dir.path().join(name);
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_directory_released_on_drop() {
        let artifact = TempArtifact::new().unwrap();
        let dir = artifact.path().parent().unwrap().to_path_buf();
        std::fs::write(artifact.path(), b"scratch").unwrap();
        assert!(dir.exists());
        drop(artifact);
        assert!(!dir.exists());
    }
}
