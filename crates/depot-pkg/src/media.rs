//! Package media metadata and content digests.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Metadata for a resolved package artifact.
///
/// Produced only by a successful `load`; a value with no further
/// lifecycle — callers own it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    /// The package this artifact belongs to.
    pub package_id: String,

    /// SHA-256 content id of the artifact.
    pub content_id: String,

    /// Where the artifact was found.
    pub path: PathBuf,

    /// Artifact size in bytes.
    pub size: u64,
}

/// Local existence + metadata check. Returns the artifact size, `None`
/// when there is no file at `path`.
///
/// # Errors
///
/// Propagates any error other than the path not existing; unreadable
/// storage is fatal to the caller.
pub(crate) fn probe(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        // A directory where an artifact should be is not loadable media.
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Streaming SHA-256 hex digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
