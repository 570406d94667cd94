//! Object store boundary and artifact download
//!
//! [`fetch_artifact`] streams an object into a sibling temporary file and only
//! renames it over the destination once every chunk has been written and
//! synced. A failed transfer never leaves a truncated binary behind for the
//! verifier to hash.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::error::FetchError;

/// Streamed object body
pub type ObjectStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Read access to an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open `key` in `bucket` for streaming.
    ///
    /// Implementations must not retry beyond what their transport does.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, FetchError>;
}

static DOWNLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Download `key` from `bucket` to `dest`, replacing any existing file.
///
/// # Errors
///
/// Returns [`FetchError::NotFound`] or [`FetchError::Transport`] from the
/// store, and [`FetchError::LocalWrite`] if the file cannot be written.
pub async fn fetch_artifact(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    dest: &Path,
) -> Result<u64, FetchError> {
    debug!(bucket, key, dest = %dest.display(), "Fetching artifact");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::local_write(parent, e))?;
    }

    let stream = store.get_object(bucket, key).await?;
    let partial = partial_path(dest);

    match write_stream(stream, &partial).await {
        Ok(written) => {
            tokio::fs::rename(&partial, dest)
                .await
                .map_err(|e| FetchError::local_write(dest, e))
                .inspect_err(|_| discard(&partial))?;
            debug!(key, bytes = written, dest = %dest.display(), "Fetched artifact");
            Ok(written)
        }
        Err(e) => {
            discard(&partial);
            Err(e)
        }
    }
}

async fn write_stream(mut stream: ObjectStream, partial: &Path) -> Result<u64, FetchError> {
    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| FetchError::local_write(partial, e))?;

    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::local_write(partial, e))?;
        written += chunk.len() as u64;
        trace!(bytes = written, "Wrote chunk");
    }

    file.flush()
        .await
        .map_err(|e| FetchError::local_write(partial, e))?;
    file.sync_all()
        .await
        .map_err(|e| FetchError::local_write(partial, e))?;
    set_executable(&file, partial).await?;

    Ok(written)
}

#[cfg(unix)]
async fn set_executable(file: &tokio::fs::File, path: &Path) -> Result<(), FetchError> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| FetchError::local_write(path, e))
}

#[cfg(not(unix))]
async fn set_executable(_file: &tokio::fs::File, _path: &Path) -> Result<(), FetchError> {
    Ok(())
}

/// Unique hidden sibling of `dest`, so concurrent downloads never share one
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map_or_else(|| "artifact".into(), |n| n.to_string_lossy());
    let seq = DOWNLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{name}.{}-{seq}.part", std::process::id()))
}

fn discard(partial: &Path) {
    match std::fs::remove_file(partial) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            debug!(path = %partial.display(), error = %e, "Failed to remove partial download");
        }
        _ => {}
    }
}
