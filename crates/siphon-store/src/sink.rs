use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use serde::Serialize;
use siphon_core::error::HarvestError;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

fn parent_dir(path: &Path) -> Result<&Path, HarvestError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| HarvestError::fs(dir, e))?;
    Ok(dir)
}

/// Writes JSON documents atomically.
///
/// Documents are pretty-printed with two-space indentation and non-ASCII
/// characters are written as literal UTF-8. The bytes go to a temporary file
/// in the target directory which is then renamed over the target, so a
/// reader sees either the old file or the complete new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

impl JsonSink {
    pub fn new() -> Self {
        Self
    }

    /// Serializes `value` to `path`, creating parent directories.
    ///
    /// Serialization happens on the caller; the file work runs on the
    /// blocking pool. Returns the number of bytes written.
    pub async fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<usize, HarvestError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = path.to_path_buf();
        let written = tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| HarvestError::Generic(format!("write of {} did not finish: {}", path.display(), e)))??;

        debug!(path = %path.display(), bytes = written, "Wrote JSON");
        Ok(written)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<usize, HarvestError> {
    let dir = parent_dir(path)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| HarvestError::fs(dir, e))?;
    tmp.write_all(bytes).map_err(|e| HarvestError::fs(tmp.path(), e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| HarvestError::fs(path, e))?;
    tmp.persist(path)
        .map_err(|e| HarvestError::fs(path, e.error))?;
    Ok(bytes.len())
}

/// Writes byte streams (media, downloaded files) atomically.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaSink;

impl MediaSink {
    pub fn new() -> Self {
        Self
    }

    /// Drains `stream` into `path`.
    ///
    /// If the stream yields an error the temporary file is removed and the
    /// target is left untouched. Returns the number of bytes written.
    pub async fn write_stream<S>(&self, path: &Path, stream: S) -> Result<u64, HarvestError>
    where
        S: Stream<Item = Result<Vec<u8>, HarvestError>> + Send,
    {
        let dir = parent_dir(path)?;
        let (file, temp_path) = NamedTempFile::new_in(dir)
            .map_err(|e| HarvestError::fs(dir, e))?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut stream = std::pin::pin!(stream);
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| HarvestError::fs(PathBuf::from(&*temp_path), e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| HarvestError::fs(path, e))?;
        file.sync_all().await.map_err(|e| HarvestError::fs(path, e))?;
        drop(file);

        temp_path
            .persist(path)
            .map_err(|e| HarvestError::fs(path, e.error))?;
        debug!(path = %path.display(), bytes = written, "Wrote media");
        Ok(written)
    }
}
