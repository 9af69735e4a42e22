//! The installed-package index.
//!
//! Each environment tracks what is installed under it in an `index.toml`
//! next to its package directory:
//!
//! ```toml
//! version = 1
//!
//! [[package]]
//! name = "caldav"
//! version = "1.2.0"
//! channel = "stable"
//! content-id = "9f3ab0..."
//! installed-at = "2025-11-03T09:14:02Z"
//! ```
//!
//! The index is queried, never mutated, by resolution; installs refresh it
//! through the write half of the lock while in-flight loads keep reading.

use crate::version::Channel;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// The index filename, relative to an environment's base directory.
pub const INDEX_FILE: &str = "index.toml";

/// Errors that can occur when loading or saving an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to read index file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse index: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize index: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One installed version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledVersion {
    /// The concrete installed version.
    pub version: Version,

    /// Release track this install came from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,

    /// Content id of the installed artifact, if recorded.
    #[serde(default, rename = "content-id", skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    /// RFC 3339 installation timestamp, if recorded.
    #[serde(default, rename = "installed-at", skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl InstalledVersion {
    /// A descriptor with just a version, no channel or content id.
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self {
            version,
            channel: None,
            content_id: None,
            installed_at: None,
        }
    }

    /// Set the release channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the content id.
    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }
}

/// The consumed index capability: `lookup(package_id)` returns every
/// installed version descriptor for the package.
pub trait InstalledIndex: Send + Sync + fmt::Debug {
    /// Look up the installed versions of a package. Unknown packages
    /// return an empty set.
    fn lookup(&self, package_id: &str) -> Vec<InstalledVersion>;
}

/// On-disk index format.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(default, rename = "package")]
    packages: Vec<IndexRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    name: String,
    #[serde(flatten)]
    installed: InstalledVersion,
}

/// TOML-file-backed installed-package index.
///
/// Entries sit behind an `RwLock`: `lookup` takes the read half, `insert`
/// and `refresh_from` the write half.
#[derive(Debug, Default)]
pub struct PackageIndex {
    entries: RwLock<BTreeMap<String, Vec<InstalledVersion>>>,
}

impl PackageIndex {
    /// Current index format version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index from a file. A missing file is an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let file: IndexFile = toml::from_str(&content)?;

        let mut entries: BTreeMap<String, Vec<InstalledVersion>> = BTreeMap::new();
        for record in file.packages {
            entries.entry(record.name).or_default().push(record.installed);
        }
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Save the index to a file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let packages = entries
            .iter()
            .flat_map(|(name, installed)| {
                installed.iter().map(|iv| IndexRecord {
                    name: name.clone(),
                    installed: iv.clone(),
                })
            })
            .collect();
        drop(entries);

        let file = IndexFile {
            version: Self::CURRENT_VERSION,
            packages,
        };
        let content = toml::to_string_pretty(&file)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Record an installed version of a package.
    pub fn insert(&self, package_id: &str, installed: InstalledVersion) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(package_id.to_string())
            .or_default()
            .push(installed);
    }

    /// Replace the contents with a fresh load from `path`, synchronized
    /// against in-flight readers.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed; on error the
    /// previous contents are kept.
    pub fn refresh_from(&self, path: &Path) -> Result<(), IndexError> {
        let fresh = Self::load(path)?;
        let fresh_entries = fresh
            .entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh_entries;
        Ok(())
    }

    /// Number of packages with at least one installed version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no package is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InstalledIndex for PackageIndex {
    fn lookup(&self, package_id: &str) -> Vec<InstalledVersion> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(package_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let index = PackageIndex::load(&tmp.path().join(INDEX_FILE)).unwrap();
        assert!(index.is_empty());
        assert!(index.lookup("caldav").is_empty());
    }

    #[test]
    fn lookup_unknown_package_is_empty() {
        let index = PackageIndex::new();
        index.insert("caldav", InstalledVersion::new(v("1.0.0")));
        assert!(index.lookup("other").is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE);

        let index = PackageIndex::new();
        index.insert(
            "caldav",
            InstalledVersion::new(v("1.2.0"))
                .with_channel(Channel::Stable)
                .with_content_id("9f3ab0"),
        );
        index.insert("caldav", InstalledVersion::new(v("2.0.0")));
        index.insert("mailbox", InstalledVersion::new(v("0.3.1")));
        index.save(&path).unwrap();

        let loaded = PackageIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let caldav = loaded.lookup("caldav");
        assert_eq!(caldav.len(), 2);
        assert_eq!(caldav[0].version, v("1.2.0"));
        assert_eq!(caldav[0].channel, Some(Channel::Stable));
        assert_eq!(caldav[0].content_id.as_deref(), Some("9f3ab0"));
        assert_eq!(caldav[1].version, v("2.0.0"));
    }

    #[test]
    fn parse_on_disk_format() {
        let content = r#"
version = 1

[[package]]
name = "caldav"
version = "1.2.0"
channel = "beta"

[[package]]
name = "caldav"
version = "1.0.0"
"#;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE);
        std::fs::write(&path, content).unwrap();

        let index = PackageIndex::load(&path).unwrap();
        let caldav = index.lookup("caldav");
        assert_eq!(caldav.len(), 2);
        assert_eq!(caldav[0].channel, Some(Channel::Beta));
        assert_eq!(caldav[1].channel, None);
    }

    #[test]
    fn refresh_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE);

        let on_disk = PackageIndex::new();
        on_disk.insert("mailbox", InstalledVersion::new(v("0.3.1")));
        on_disk.save(&path).unwrap();

        let index = PackageIndex::new();
        index.insert("caldav", InstalledVersion::new(v("1.0.0")));
        index.refresh_from(&path).unwrap();

        assert!(index.lookup("caldav").is_empty());
        assert_eq!(index.lookup("mailbox").len(), 1);
    }

    #[test]
    fn malformed_index_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(INDEX_FILE);
        std::fs::write(&path, "version = \"not a number\"").unwrap();
        assert!(matches!(
            PackageIndex::load(&path).unwrap_err(),
            IndexError::Parse(_)
        ));
    }
}
