//! Layered package environments.
//!
//! An environment owns one configuration's package directory, object
//! directory, strictness flag, and installed-package index, plus an ordered
//! list of parent environments to fall back to on a miss. Lookups resolve
//! an identifier string into [`MediaInfo`] for a concrete local artifact.

use crate::config::{self, EnvConfig};
use crate::ident::{IdentError, PackageIdent};
use crate::index::{InstalledIndex, PackageIndex, INDEX_FILE};
use crate::install::{Installer, LocalInstaller};
use crate::media::{self, MediaInfo};
use crate::version::{self, Channel, ResolveError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Package artifacts directory under an environment's base directory.
pub const PACKAGES_DIR: &str = "packages";

/// Content-addressed object directory under an environment's base directory.
pub const OBJECTS_DIR: &str = "objects";

/// Errors that can occur while loading a package.
///
/// Resolution failures are explicit outcomes returned to the caller;
/// only `Io` reports a genuinely unexpected condition (unreadable storage).
#[derive(Error, Debug)]
pub enum LoadError {
    /// The identifier string could not be parsed.
    #[error("invalid identifier: {0}")]
    Ident(#[from] IdentError),

    /// Version resolution failed; `ResolveError::NoMatch` means no
    /// installed version satisfies the requested spec.
    #[error("version resolution failed: {0}")]
    Version(#[from] ResolveError),

    /// No media at any searched location, parents included.
    #[error("package '{ident}' not found after searching {} location(s)", .searched.len())]
    NotFound {
        ident: String,
        /// Every location probed, local roots first, then parent roots in
        /// declared parent order.
        searched: Vec<PathBuf>,
    },

    /// Media was found but failed strict content verification.
    #[error("integrity mismatch at '{}': expected {expected}, got {actual}", .path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Unreadable storage.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One configuration's package environment.
///
/// Created once per configuration path (via [`crate::EnvRegistry`]) and
/// shared for the life of the process.
#[derive(Debug)]
pub struct PackageEnvironment {
    /// The configuration document this environment was built from, if any.
    config_path: Option<PathBuf>,

    /// Ordered lookup roots; the environment's own package directory comes
    /// first, then any configured prefixes.
    roots: Vec<PathBuf>,

    /// Content-addressed object store root.
    object_dir: PathBuf,

    /// Require content verification before a load succeeds.
    strict: bool,

    /// Installed-package index handle.
    index: Arc<dyn InstalledIndex>,

    /// Parent environments, searched in declared order on a local miss.
    /// The registry owns their lifetimes.
    parents: RwLock<Vec<Arc<PackageEnvironment>>>,
}

impl PackageEnvironment {
    /// Open an environment from a configuration path.
    ///
    /// Never fails: a missing or malformed configuration degrades to
    /// defaults, and a missing index file is an empty index.
    pub fn open(config_path: impl AsRef<Path>) -> Self {
        let config_path = config_path.as_ref();
        let cfg = EnvConfig::load(config_path);
        let base = config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_config(Some(config_path.to_path_buf()), base, &cfg)
    }

    /// An environment with default settings rooted at `base_dir`, for
    /// callers with no configuration document.
    pub fn with_defaults(base_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(None, base_dir.into(), &EnvConfig::default())
    }

    fn from_config(config_path: Option<PathBuf>, base: PathBuf, cfg: &EnvConfig) -> Self {
        let mut roots = vec![base.join(PACKAGES_DIR)];
        for root in config::preprocess_prefixes(&base, &cfg.env.prefixs) {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        let index_path = base.join(INDEX_FILE);
        let index = PackageIndex::load(&index_path).unwrap_or_else(|e| {
            warn!(path = %index_path.display(), error = %e, "failed to load package index, starting empty");
            PackageIndex::new()
        });

        debug!(
            base = %base.display(),
            strict = cfg.env.is_strict,
            roots = roots.len(),
            "opened package environment"
        );

        Self {
            config_path,
            roots,
            object_dir: base.join(OBJECTS_DIR),
            strict: cfg.env.is_strict,
            index: Arc::new(index),
            parents: RwLock::new(Vec::new()),
        }
    }

    /// Replace the index handle. Intended for wiring a shared or
    /// instrumented index before the environment is handed out.
    pub fn set_index(&mut self, index: Arc<dyn InstalledIndex>) {
        self.index = index;
    }

    /// Append a parent environment to the fallback chain. Attaching an
    /// environment to itself or attaching the same parent twice is a no-op.
    pub fn attach_parent(&self, parent: Arc<PackageEnvironment>) {
        if std::ptr::eq(self, Arc::as_ptr(&parent)) {
            warn!("ignoring attempt to attach an environment as its own parent");
            return;
        }
        let mut parents = self.parents.write().unwrap_or_else(PoisonError::into_inner);
        if parents.iter().any(|p| Arc::ptr_eq(p, &parent)) {
            return;
        }
        parents.push(parent);
    }

    /// The configuration path this environment was opened from.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// The environment's own package directory.
    #[must_use]
    pub fn package_dir(&self) -> &Path {
        &self.roots[0]
    }

    /// Every lookup root, in search order.
    #[must_use]
    pub fn lookup_roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The content-addressed object directory.
    #[must_use]
    pub fn object_dir(&self) -> &Path {
        &self.object_dir
    }

    /// Whether loads verify content before returning.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Number of parent environments in the fallback chain.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.parents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The installer capability for materializing resolved media.
    #[must_use]
    pub fn installer(&self) -> Arc<dyn Installer> {
        Arc::new(LocalInstaller::new(self.strict))
    }

    /// Resolve an identifier string to local package media, falling back
    /// to parent environments on a miss.
    ///
    /// # Errors
    ///
    /// All resolution failures come back as explicit [`LoadError`] values;
    /// see the variant docs.
    pub fn load(&self, name: &str) -> Result<MediaInfo, LoadError> {
        self.load_inner(name, true)
    }

    /// Resolve against this environment only. This is the one-hop probe
    /// parents receive during fallback, so a parent's own parents are
    /// never searched and a cyclic parent chain cannot loop.
    ///
    /// # Errors
    ///
    /// As for [`Self::load`].
    pub fn load_shallow(&self, name: &str) -> Result<MediaInfo, LoadError> {
        self.load_inner(name, false)
    }

    fn load_inner(&self, name: &str, search_parent: bool) -> Result<MediaInfo, LoadError> {
        let ident = match PackageIdent::parse(name) {
            Ok(ident) => ident,
            Err(e) => {
                warn!(ident = name, depth = 0, error = %e, "load failed");
                return Err(e.into());
            }
        };

        let (candidates, expected) = match self.candidate_paths(&ident) {
            Ok(out) => out,
            Err(e) => {
                warn!(ident = %ident, depth = 0, error = %e, "load failed");
                return Err(e);
            }
        };

        for path in &candidates {
            if let Some(size) = media::probe(path)? {
                return self.finish(&ident, path, size, expected.as_deref());
            }
        }

        let mut searched = candidates;
        let mut depth = 0usize;

        if search_parent {
            let parents = self.parents.read().unwrap_or_else(PoisonError::into_inner);
            for parent in parents.iter() {
                depth = 1;
                match parent.load_shallow(name) {
                    Ok(info) => {
                        debug!(
                            ident = %ident,
                            path = %info.path.display(),
                            "resolved in parent environment"
                        );
                        return Ok(info);
                    }
                    Err(err @ (LoadError::Integrity { .. } | LoadError::Io(_))) => {
                        return Err(err);
                    }
                    Err(LoadError::NotFound {
                        searched: parent_searched,
                        ..
                    }) => {
                        searched.extend(parent_searched);
                    }
                    Err(err) => {
                        debug!(ident = %ident, error = %err, "parent environment miss");
                    }
                }
            }
        }

        warn!(
            ident = %ident,
            depth,
            locations = searched.len(),
            "package not found"
        );
        Err(LoadError::NotFound {
            ident: ident.to_string(),
            searched,
        })
    }

    /// Determine the locations to probe and the expected content id, if
    /// one is known up front.
    fn candidate_paths(
        &self,
        ident: &PackageIdent,
    ) -> Result<(Vec<PathBuf>, Option<String>), LoadError> {
        // Content id present: a direct, unambiguous address. Version
        // resolution is bypassed entirely.
        if let Some(ref cid) = ident.content_id {
            let bucket = ident.object_id.as_deref().unwrap_or(&ident.package_id);
            let path = self.object_dir.join(bucket).join(cid);
            return Ok((vec![path], Some(cid.clone())));
        }

        let (file_name, expected) = match ident.version_spec {
            Some(ref spec) => match Channel::from_token(spec) {
                // A pure channel names a track, not an installed version;
                // nothing to resolve against the index.
                Some(channel) => (format!("{}#{channel}", ident.package_id), None),
                None => {
                    let installed =
                        version::resolve_exact(&ident.package_id, spec, self.index.as_ref())?;
                    let name = format!("{}#{}", ident.package_id, installed.version);
                    (name, installed.content_id)
                }
            },
            None => match version::resolve_default(&ident.package_id, self.index.as_ref()) {
                Some(installed) => {
                    let name = match installed.channel {
                        Some(channel) => {
                            format!("{}#{channel}#{}", ident.package_id, installed.version)
                        }
                        None => format!("{}#{}", ident.package_id, installed.version),
                    };
                    (name, installed.content_id)
                }
                None => (ident.package_id.clone(), None),
            },
        };

        let candidates = self.roots.iter().map(|r| r.join(&file_name)).collect();
        Ok((candidates, expected))
    }

    fn finish(
        &self,
        ident: &PackageIdent,
        path: &Path,
        size: u64,
        expected: Option<&str>,
    ) -> Result<MediaInfo, LoadError> {
        let content_id = if self.strict {
            let actual = media::file_digest(path)?;
            if let Some(expected) = expected {
                if actual != expected {
                    warn!(
                        ident = %ident,
                        path = %path.display(),
                        "strict content verification failed"
                    );
                    return Err(LoadError::Integrity {
                        path: path.to_path_buf(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
            actual
        } else {
            match expected {
                Some(expected) => expected.to_string(),
                None => media::file_digest(path)?,
            }
        };

        debug!(ident = %ident, path = %path.display(), size, "resolved package media");
        Ok(MediaInfo {
            package_id: ident.package_id.clone(),
            content_id,
            path: path.to_path_buf(),
            size,
        })
    }
}
