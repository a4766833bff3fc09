//! ResultStore - Durable storage for frames and analysis records
//!
//! ## Layout
//!
//! ```text
//! <frames_dir>/<frame id>.jpg
//! <analysis_dir>/analysis_<timestamp key>.json
//! <analysis_dir>/analysis_results_<timestamp>.json   (batch collections)
//! ```
//!
//! Files are created with `create_new`; a name that is already taken gets
//! a numeric suffix (`_1`, `_2`, ...), so earlier runs are never
//! overwritten. Directories are created on first use.

use crate::models::{AnalysisRecord, Frame};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Upper bound on collision suffixes for one name
const MAX_NAME_SUFFIX: u32 = 10_000;

/// Storage failure
#[derive(Debug, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record file {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no free file name for {}", .0.display())]
    NameExhausted(PathBuf),
}

/// ResultStore instance
#[derive(Debug, Clone)]
pub struct ResultStore {
    frames_dir: PathBuf,
    analysis_dir: PathBuf,
}

impl ResultStore {
    pub fn new(frames_dir: impl Into<PathBuf>, analysis_dir: impl Into<PathBuf>) -> Self {
        Self {
            frames_dir: frames_dir.into(),
            analysis_dir: analysis_dir.into(),
        }
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn analysis_dir(&self) -> &Path {
        &self.analysis_dir
    }

    /// Persist one analysis record
    pub async fn save(&self, record: &AnalysisRecord) -> Result<PathBuf, PersistenceFailure> {
        let stem = format!("analysis_{}", record.timestamp().file_key());
        let data = to_json(&self.analysis_dir.join(&stem), record)?;
        let path = write_unique(&self.analysis_dir, &stem, "json", &data).await?;

        tracing::debug!(path = %path.display(), frame_ref = %record.frame_ref(), "Analysis saved");
        Ok(path)
    }

    /// Persist the raw frame image
    pub async fn save_frame(&self, frame: &Frame) -> Result<PathBuf, PersistenceFailure> {
        let path = write_unique(&self.frames_dir, frame.id(), "jpg", frame.image()).await?;

        tracing::debug!(path = %path.display(), size = frame.image().len(), "Frame saved");
        Ok(path)
    }

    /// Persist a whole run as one JSON array
    pub async fn save_collection(
        &self,
        records: &[AnalysisRecord],
    ) -> Result<PathBuf, PersistenceFailure> {
        let stem = format!("analysis_results_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let data = to_json(&self.analysis_dir.join(&stem), records)?;
        let path = write_unique(&self.analysis_dir, &stem, "json", &data).await?;

        tracing::info!(path = %path.display(), count = records.len(), "Analysis collection saved");
        Ok(path)
    }

    /// Read back one record file
    pub async fn load_record(path: &Path) -> Result<AnalysisRecord, PersistenceFailure> {
        read_json(path).await
    }

    /// Read back a collection file
    pub async fn load_collection(path: &Path) -> Result<Vec<AnalysisRecord>, PersistenceFailure> {
        read_json(path).await
    }
}

fn to_json<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<Vec<u8>, PersistenceFailure> {
    serde_json::to_vec_pretty(value).map_err(|source| PersistenceFailure::Format {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceFailure> {
    let data = fs::read(path).await.map_err(|source| PersistenceFailure::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| PersistenceFailure::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `data` to `<dir>/<stem>[_n].<ext>` without replacing existing files
async fn write_unique(
    dir: &Path,
    stem: &str,
    ext: &str,
    data: &[u8],
) -> Result<PathBuf, PersistenceFailure> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| PersistenceFailure::Write {
            path: dir.to_path_buf(),
            source,
        })?;

    for n in 0..MAX_NAME_SUFFIX {
        let name = if n == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, n, ext)
        };
        let path = dir.join(name);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(PersistenceFailure::Write { path, source }),
        };

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;

        return match written {
            Ok(()) => Ok(path),
            Err(source) => Err(PersistenceFailure::Write { path, source }),
        };
    }

    Err(PersistenceFailure::NameExhausted(dir.join(stem)))
}
