//! One JSON document per user, stored as `<identity>.json` in a data directory.
//!
//! Writes go to a uniquely named temp file in the same directory, are flushed
//! to disk, then renamed over the target. Concurrent saves therefore leave the
//! file holding exactly one of the written documents, and readers never see a
//! partial write.

use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const STATE_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("username {0:?} has no characters usable as a storage identity")]
    InvalidIdentity(String),
    #[error("stored state for '{identity}' is corrupt: {source}")]
    Corrupt {
        identity: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{source}")]
    Io {
        identity: String,
        #[source]
        source: std::io::Error,
    },
    #[error("state could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Keep alphanumerics, `-` and `_`; drop everything else.
pub fn sanitize_identity(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// Filesystem-backed state documents keyed by sanitized username.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
    strict_reads: bool,
}

impl StateStore {
    /// Open the store, creating the data directory if needed.
    pub fn open(data_dir: impl Into<PathBuf>, strict_reads: bool) -> std::io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            strict_reads,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the document owned by `username`.
    pub fn path_for(&self, username: &str) -> Result<PathBuf, StateError> {
        let identity = sanitize_identity(username);
        if identity.is_empty() {
            return Err(StateError::InvalidIdentity(username.to_owned()));
        }
        Ok(self
            .data_dir
            .join(format!("{identity}.{STATE_EXTENSION}")))
    }

    /// Read the user's document. `Ok(None)` when nothing has been saved yet.
    pub async fn load(&self, username: &str) -> Result<Option<Value>, StateError> {
        let path = self.path_for(username)?;
        let identity = sanitize_identity(username);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Io { identity, source }),
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(source) if self.strict_reads => Err(StateError::Corrupt { identity, source }),
            Err(e) => {
                tracing::warn!(identity = %identity, "Unparseable state file treated as empty: {e}");
                Ok(None)
            }
        }
    }

    /// Replace the user's document with `state`.
    pub async fn save(&self, username: &str, state: &Value) -> Result<(), StateError> {
        let path = self.path_for(username)?;
        let identity = sanitize_identity(username);
        let bytes = serde_json::to_vec(state)?;

        let tmp_path = self
            .data_dir
            .join(format!(".{identity}.{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(source) = write_synced(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StateError::Io { identity, source });
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StateError::Io { identity, source });
        }
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
