use std::{io::ErrorKind, path::PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{is_valid_key, ArchiveStore};
use crate::transform::{CleanedReading, COLUMNS};

/// Filesystem-backed archive: key `"2023/2023-12-18.csv"` lives at
/// `{root}/2023/2023-12-18.csv`.
#[derive(Debug, Clone)]
pub struct LocalArchiveStore {
    root: PathBuf,
}

impl LocalArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` under the root, refusing anything that could escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            bail!("invalid archive key: {key:?}");
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArchiveStore for LocalArchiveStore {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to list {}", dir.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = format!("{dir_key}{name}");
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{key}/")));
                } else if file_type.is_file() && !name.ends_with(".tmp") && key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort_unstable();
        debug!(prefix = %prefix, count = keys.len(), "Listed archive keys");
        Ok(keys)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<CleanedReading>>> {
        let path = self.object_path(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read archive object {key}")),
        };

        let rows = decode_rows(&bytes).with_context(|| format!("corrupt archive object {key}"))?;
        debug!(key = %key, rows = rows.len(), "Loaded archive object");
        Ok(Some(rows))
    }

    async fn save(&self, key: &str, rows: &[CleanedReading]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content = encode_rows(rows)?;

        // Write aside and rename so readers never see a half-written object.
        let tmp = path.with_extension("csv.tmp");
        fs::write(&tmp, &content)
            .await
            .with_context(|| format!("failed to write archive object {key}"))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to publish archive object {key}"))?;

        debug!(key = %key, rows = rows.len(), bytes = content.len(), "Saved archive object");
        Ok(())
    }
}

fn encode_rows(rows: &[CleanedReading]) -> Result<Vec<u8>> {
    // Header written by hand so that empty objects still carry it.
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    w.write_record(COLUMNS)?;
    for row in rows {
        w.serialize(row)?;
    }
    w.into_inner().context("failed to flush archive CSV")
}

fn decode_rows(bytes: &[u8]) -> Result<Vec<CleanedReading>> {
    let mut r = csv::Reader::from_reader(bytes);

    let headers = r.headers()?;
    if !headers.iter().eq(COLUMNS) {
        bail!("unexpected archive columns: {headers:?}");
    }

    r.deserialize()
        .collect::<Result<Vec<CleanedReading>, _>>()
        .context("failed to decode archive row")
}
