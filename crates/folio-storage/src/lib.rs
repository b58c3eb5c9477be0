//! Persisted catalog storage for Folio.
//!
//! The catalog is a single pretty-printed JSON array of [`ProjectRecord`]s
//! with a trailing newline, the sole hand-off artifact to the rendering
//! layer. Both pipeline stages overwrite it wholesale; writes go through a
//! temp file and an atomic rename so a failed run never commits a partial
//! document.

use std::path::{Path, PathBuf};

use anyhow::Context;
use folio_core::ProjectRecord;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "folio-storage";

#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole catalog document.
    pub async fn load(&self) -> anyhow::Result<Vec<ProjectRecord>> {
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading catalog {}", self.path.display()))?;
        let records: Vec<ProjectRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parsing catalog {}", self.path.display()))?;
        debug!(records = records.len(), path = %self.path.display(), "catalog loaded");
        Ok(records)
    }

    /// Overwrite the whole catalog atomically via temp file + rename.
    pub async fn save(&self, records: &[ProjectRecord]) -> anyhow::Result<()> {
        let mut bytes = serde_json::to_vec_pretty(records).context("serializing catalog")?;
        bytes.push(b'\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating catalog directory {}", parent.display()))?;
            }
        }

        let temp_name = format!(".{}.catalog.tmp", Uuid::new_v4());
        let temp_path = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(temp_name),
            _ => PathBuf::from(temp_name),
        };

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp catalog file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp catalog file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp catalog file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp catalog {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }

        debug!(records = records.len(), path = %self.path.display(), "catalog written");
        Ok(())
    }
}
