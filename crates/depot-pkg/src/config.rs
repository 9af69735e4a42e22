//! Environment configuration documents.
//!
//! ```toml
//! [env]
//! is_strict = true
//! prefixs = ["vendor/packages", "/srv/depot/packages"]
//! ```
//!
//! Loading is tolerant: a missing path means defaults, and a malformed
//! document logs a diagnostic and degrades to defaults rather than failing
//! environment construction. Unknown keys are ignored.

use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A parsed environment configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvConfig {
    /// The `[env]` section.
    #[serde(default)]
    pub env: EnvSection,
}

/// Recognized `[env]` options.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvSection {
    /// Require content verification before a load succeeds.
    #[serde(default = "default_true")]
    pub is_strict: bool,

    /// Extra lookup roots, searched after the environment's own package
    /// directory. `prefixs` is the key existing configuration files use.
    #[serde(default)]
    pub prefixs: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for EnvSection {
    fn default() -> Self {
        Self {
            is_strict: true,
            prefixs: Vec::new(),
        }
    }
}

impl EnvConfig {
    /// Load a configuration document. Never fails: a missing file yields
    /// defaults, and an unreadable or malformed one is logged and yields
    /// defaults.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no environment config, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read environment config, using defaults");
                return Self::default();
            }
        };

        match toml::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed environment config, using defaults");
                Self::default()
            }
        }
    }
}

/// Preprocess configured prefixes into lookup roots.
///
/// Relative entries are anchored at `base`, glob patterns expand to the
/// directories they match, duplicates are dropped, and declared order is
/// preserved.
pub(crate) fn preprocess_prefixes(base: &Path, prefixs: &[String]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();

    for raw in prefixs {
        let anchored = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            base.join(raw)
        };

        let has_glob_meta = raw.contains(['*', '?', '[']);
        if !has_glob_meta {
            push_unique(&mut roots, anchored);
            continue;
        }

        let pattern = anchored.to_string_lossy().into_owned();
        match glob::glob(&pattern) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_dir() {
                        push_unique(&mut roots, entry);
                    }
                }
            }
            Err(e) => {
                warn!(prefix = %raw, error = %e, "invalid prefix pattern, skipping");
            }
        }
    }

    roots
}

fn push_unique(roots: &mut Vec<PathBuf>, root: PathBuf) {
    if !roots.contains(&root) {
        roots.push(root);
    }
}
