use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::submission::{RecordKey, Submission};

/// Every persisted record, ordered by key.
pub type Records = BTreeMap<RecordKey, Submission>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on record store: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize records: {0}")]
    Serialize(serde_json::Error),
    #[error("record store writer has stopped")]
    WriterClosed,
}

/// The on-disk collection of records, one JSON object in one file.
///
/// Every update is a full load, insert and rewrite. The rewrite goes to a
/// sibling temporary file that is then renamed over the store, so readers
/// see either the old or the new mapping. Nothing here serializes
/// concurrent updates; route writers through
/// [`StoreWriter`](crate::store_writer::StoreWriter) for that.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RecordStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory and seeds the file with an empty
    /// mapping. An existing file is left untouched, even if it is corrupt.
    pub async fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if !fs::try_exists(&self.path).await? {
            self.save(&Records::new()).await?;
            tracing::info!(path = %self.path.display(), "created empty record store");
        }

        Ok(())
    }

    pub async fn load(&self) -> Result<Records, StoreError> {
        let contents = fs::read(&self.path).await?;

        serde_json::from_slice(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Loads the store, inserts or overwrites `key`, and writes the whole
    /// mapping back. A corrupt store is reported and never overwritten.
    pub async fn append_and_save(
        &self,
        key: RecordKey,
        submission: Submission,
    ) -> Result<(), StoreError> {
        let mut records = self.load().await?;

        if records.insert(key.clone(), submission).is_some() {
            tracing::warn!(%key, "record key collision, previous record overwritten");
        }

        self.save(&records).await
    }

    async fn save(&self, records: &Records) -> Result<(), StoreError> {
        let contents = to_pretty_json(records)?;

        // The temporary file must be on disk before it replaces the store.
        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

// Store files are indented with four spaces.
fn to_pretty_json(records: &Records) -> Result<Vec<u8>, StoreError> {
    let mut contents = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut contents, formatter);

    records
        .serialize(&mut serializer)
        .map_err(StoreError::Serialize)?;

    Ok(contents)
}
