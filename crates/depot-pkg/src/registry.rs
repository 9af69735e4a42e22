//! The environment registry.
//!
//! Maps configuration paths to [`PackageEnvironment`] instances,
//! identity-preserving: the first lookup for a path constructs the
//! environment, every later lookup returns the same `Arc`. The registry is
//! an explicit value callers pass around, constructed where the process
//! decides and reset-able for tests.

use crate::env::PackageEnvironment;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// The environment configuration filename under a config directory.
pub const CONFIG_FILE: &str = "env.toml";

/// Process-wide cache of package environments, one per configuration path.
#[derive(Debug, Default)]
pub struct EnvRegistry {
    envs: Mutex<HashMap<PathBuf, Arc<PackageEnvironment>>>,
}

impl EnvRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the environment for a configuration path, constructing it on
    /// first lookup.
    ///
    /// Construction happens under the registry lock, so concurrent first
    /// lookups for the same path still produce exactly one instance, and
    /// repeated lookups return the identical `Arc`. Paths are cache keys
    /// as given; two spellings of one location are two environments.
    pub fn environment(&self, config_path: impl AsRef<Path>) -> Arc<PackageEnvironment> {
        let config_path = config_path.as_ref();
        let mut envs = self.envs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(env) = envs.get(config_path) {
            return Arc::clone(env);
        }

        debug!(path = %config_path.display(), "constructing package environment");
        let env = Arc::new(PackageEnvironment::open(config_path));
        envs.insert(config_path.to_path_buf(), Arc::clone(&env));
        env
    }

    /// The per-user environment, chained onto the system environment so a
    /// user-local miss falls back to the machine-wide install set.
    pub fn user_environment(&self) -> Arc<PackageEnvironment> {
        let user = self.environment(user_config_path());
        let system = self.system_environment();
        if !Arc::ptr_eq(&user, &system) {
            user.attach_parent(system);
        }
        user
    }

    /// The machine-wide environment.
    pub fn system_environment(&self) -> Arc<PackageEnvironment> {
        self.environment(system_config_path())
    }

    /// Drop every cached environment. The next lookup for any path
    /// constructs a fresh instance; intended for test isolation.
    pub fn reset(&self) {
        self.envs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached environments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no environment has been constructed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The per-user configuration path: `$XDG_CONFIG_HOME/depot/env.toml`,
/// falling back to `~/.config/depot/env.toml`.
fn user_config_path() -> PathBuf {
    config_home().join("depot").join(CONFIG_FILE)
}

/// The machine-wide configuration path.
fn system_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(program_data) = std::env::var("PROGRAMDATA") {
            return PathBuf::from(program_data).join("depot").join(CONFIG_FILE);
        }
    }
    PathBuf::from("/etc").join("depot").join(CONFIG_FILE)
}

/// Platform-appropriate configuration directory.
fn config_home() -> PathBuf {
    if let Ok(config) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config);
    }
    if let Some(home) = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
    {
        #[cfg(target_os = "macos")]
        {
            return PathBuf::from(&home)
                .join("Library")
                .join("Application Support");
        }
        #[cfg(not(target_os = "macos"))]
        {
            return PathBuf::from(home).join(".config");
        }
    }
    PathBuf::from(".config")
}
