//! Static registry mapping functions to their measurement workers.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read worker manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed worker manifest line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },

    #[error("no worker registered for function {0:?}")]
    UnknownFunction(String),
}

/// Parsed worker manifest: one `function socket-path` pair per line.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, PathBuf>,
}

impl WorkerRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        let mut workers = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [function, socket] = fields[..] else {
                return Err(RegistryError::MalformedLine {
                    line: idx + 1,
                    text: line.to_string(),
                });
            };
            workers.insert(function.to_string(), PathBuf::from(socket));
        }
        Ok(Self { workers })
    }

    /// Socket address of the worker serving `function`; an unknown function
    /// is a configuration error, reported before any work is attempted.
    pub fn lookup(&self, function: &str) -> Result<&Path, RegistryError> {
        self.workers
            .get(function)
            .map(PathBuf::as_path)
            .ok_or_else(|| RegistryError::UnknownFunction(function.to_string()))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let registry = WorkerRegistry::parse(
            "compute\t/tmp/tuning-abc/socket\nupdate /tmp/tuning-def/socket\n\n",
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("compute").unwrap(),
            Path::new("/tmp/tuning-abc/socket")
        );
    }

    #[test]
    fn test_unknown_function() {
        let registry = WorkerRegistry::parse("compute /tmp/s\n").unwrap();
        assert!(matches!(
            registry.lookup("absent"),
            Err(RegistryError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_malformed_line() {
        let err = WorkerRegistry::parse("compute\n").unwrap_err();
        assert!(matches!(err, RegistryError::MalformedLine { line: 1, .. }));
    }
}
