//! Artifact integrity digests

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::DigestError;

const BUFFER_SIZE: usize = 8192;

/// Compute the SHA-256 digest of a file as lowercase hex.
///
/// The file is streamed through a fixed-size buffer, so memory use does not
/// depend on the file size.
///
/// # Errors
///
/// Returns [`DigestError::FileUnreadable`] if the file cannot be opened or read.
pub async fn digest_file(path: &Path) -> Result<String, DigestError> {
    let unreadable = |source| DigestError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await.map_err(unreadable)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
