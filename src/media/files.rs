use crate::events::MediaData;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Load the raw bytes of a media payload, fetching over HTTP when the
/// protocol layer handed us a URL instead of inline bytes.
pub async fn load_media_bytes(data: &MediaData) -> Result<Vec<u8>> {
    match data {
        MediaData::Bytes(bytes) => Ok(bytes.clone()),
        MediaData::Url(url) => {
            let response = reqwest::get(url).await?;
            let response = response.error_for_status()?;
            let bytes = response.bytes().await?;
            Ok(bytes.to_vec())
        }
    }
}

/// Move `source` into `dir` as `filename`, preferring an atomic rename and
/// falling back to copy+delete when the rename fails (cross-volume moves).
///
/// Returns `None` when the source no longer exists — an already-reaped
/// artifact is a normal outcome, not an error.
pub async fn move_into(source: &Path, dir: &Path, filename: &str) -> Result<Option<PathBuf>> {
    let target = dir.join(filename);
    match tokio::fs::rename(source, &target).await {
        Ok(()) => Ok(Some(target)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(rename_error) => {
            tracing::debug!(
                source = %source.display(),
                target = %target.display(),
                error = %rename_error,
                "rename failed, falling back to copy+delete"
            );
            match copy_then_remove(source, &target).await {
                Ok(found) => Ok(found.then_some(target)),
                Err(error) => Err(error).with_context(|| {
                    format!("failed to move {} into {}", source.display(), dir.display())
                }),
            }
        }
    }
}

/// Copy `source` into `dir` as `filename`, leaving the source in place.
/// Returns `None` when the source no longer exists.
pub async fn copy_into(source: &Path, dir: &Path, filename: &str) -> Result<Option<PathBuf>> {
    let target = dir.join(filename);
    match tokio::fs::copy(source, &target).await {
        Ok(_) => Ok(Some(target)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| {
            format!("failed to copy {} into {}", source.display(), dir.display())
        }),
    }
}

/// Delete a file, treating "already gone" as success.
pub async fn remove_quietly(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), %error, "failed to remove file");
    }
}

async fn copy_then_remove(source: &Path, target: &Path) -> Result<bool> {
    match tokio::fs::copy(source, target).await {
        Ok(_) => {
            remove_quietly(source).await;
            Ok(true)
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}
