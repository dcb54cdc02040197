//! Directory-backed session store.
//!
//! The credential lives in `<dir>/creds.json`. Writes go to a temporary file
//! that is synced and renamed over the target, so a crash mid-write leaves
//! either the old or the new credential, never a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use molar_core::{SessionCredential, SessionError, SessionResult, SessionStore};

const CREDENTIALS_FILE: &str = "creds.json";

/// [`SessionStore`] persisting the credential as JSON in a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{CREDENTIALS_FILE}.tmp"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> SessionResult<Option<SessionCredential>> {
        let path = self.credentials_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored session");
                return Ok(None);
            }
            Err(e) => return Err(SessionError::Read(format!("{}: {e}", path.display()))),
        };

        let credential = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::Corrupt(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded stored session");
        Ok(Some(credential))
    }

    async fn save(&self, credential: &SessionCredential) -> SessionResult<()> {
        let write_err = |e: std::io::Error| SessionError::Write(e.to_string());

        fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        let bytes = serde_json::to_vec_pretty(credential)
            .map_err(|e| SessionError::Write(e.to_string()))?;

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await.map_err(write_err)?;
        file.write_all(&bytes).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, self.credentials_path())
            .await
            .map_err(write_err)?;
        debug!(dir = %self.dir.display(), "Session credential saved");
        Ok(())
    }

    async fn clear(&self) -> SessionResult<()> {
        match fs::remove_file(self.credentials_path()).await {
            Ok(()) => {
                info!(dir = %self.dir.display(), "Stored session removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Write(e.to_string())),
        }
    }
}
