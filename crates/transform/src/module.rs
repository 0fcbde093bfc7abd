//! Module ownership tracking.

use looptune_toolchain::TempArtifact;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The module a search iteration currently holds.
///
/// Scratch modules produced by the reorder tool are owned by whichever
/// transformations still reference them and are removed when the last
/// reference drops; the user's input module is never owned and never
/// removed.
#[derive(Debug, Clone)]
pub struct ModuleState {
    path: PathBuf,
    temp: Option<Arc<TempArtifact>>,
}

impl ModuleState {
    /// Wrap an externally owned input module.
    pub fn external(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    /// Take ownership of a scratch artifact.
    pub fn temporary(artifact: TempArtifact) -> Self {
        Self {
            path: artifact.path().to_path_buf(),
            temp: Some(Arc::new(artifact)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}
