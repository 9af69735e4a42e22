//! The installer capability boundary.
//!
//! Resolution only locates media; materializing it somewhere useful is the
//! installer's job. Fetching remote artifacts and unpacking archives belong
//! to the surrounding runtime, behind this trait.

use crate::media::{self, MediaInfo};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while installing resolved media.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The resolved media is no longer where resolution found it.
    #[error("source media missing at {0}")]
    SourceMissing(PathBuf),

    /// The media no longer matches the content id it was resolved with.
    #[error("content verification failed for '{package}': expected {expected}, got {actual}")]
    Corrupt {
        package: String,
        expected: String,
        actual: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Materializes resolved package media at a destination.
pub trait Installer: Send + Sync {
    /// Install `media` at `dest`, returning the installed path.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing, fails re-verification,
    /// or cannot be written to `dest`.
    fn install(&self, media: &MediaInfo, dest: &Path) -> Result<PathBuf, InstallError>;
}

/// Installs media that already exists on local disk by copying it into
/// place, re-verifying the content id it was resolved with.
#[derive(Debug, Default)]
pub struct LocalInstaller {
    verify: bool,
}

impl LocalInstaller {
    /// Create an installer; `verify` re-checks the content digest before
    /// copying.
    #[must_use]
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }
}

impl Installer for LocalInstaller {
    fn install(&self, media: &MediaInfo, dest: &Path) -> Result<PathBuf, InstallError> {
        if media::probe(&media.path)?.is_none() {
            return Err(InstallError::SourceMissing(media.path.clone()));
        }

        if self.verify && !media.content_id.is_empty() {
            let actual = media::file_digest(&media.path)?;
            if actual != media.content_id {
                return Err(InstallError::Corrupt {
                    package: media.package_id.clone(),
                    expected: media.content_id.clone(),
                    actual,
                });
            }
        }

        let target = if dest.is_dir() {
            dest.join(media.path.file_name().unwrap_or_default())
        } else {
            dest.to_path_buf()
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&media.path, &target)?;
        Ok(target)
    }
}
