use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{HuntError, Result};

/// Persisted browser authentication state. The bytes are owned by the
/// browser layer; nothing here looks inside them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    blob: Option<Vec<u8>>,
}

impl SessionState {
    pub fn unauthenticated() -> Self {
        Self { blob: None }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { blob: Some(bytes) }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.blob.is_some()
    }

    /// Reads the session file. A missing file is an unauthenticated session,
    /// not an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                tracing::debug!("Loaded session state from {}", path.display());
                Ok(Self::from_bytes(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "No session state at {}, continuing without login",
                    path.display()
                );
                Ok(Self::unauthenticated())
            }
            Err(source) => Err(HuntError::Session {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Overwrites the session file with the captured blob. An
    /// unauthenticated state carries no blob, so it writes nothing and an
    /// earlier login on disk survives.
    pub fn save(&self, path: &Path) -> Result<()> {
        let Some(bytes) = &self.blob else {
            return Ok(());
        };
        let wrap = |source| HuntError::Session {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        fs::write(path, bytes).map_err(wrap)?;
        tracing::debug!("Saved session state to {}", path.display());
        Ok(())
    }
}
