//! Version and channel resolution over the installed-package index.
//!
//! A version spec may be a channel token (`stable`, `beta`, `nightly`)
//! rather than a concrete constraint; channel detection is a fixed token
//! lookup and never touches the index. Constraint resolution queries the
//! index snapshot it is given and picks the highest satisfying version.
//! Both are pure queries: no mutation, no I/O.

use crate::index::{InstalledIndex, InstalledVersion};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during version resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Invalid version requirement syntax.
    #[error("invalid version requirement '{requirement}' for package '{package}': {reason}")]
    InvalidRequirement {
        package: String,
        requirement: String,
        reason: String,
    },

    /// No installed version satisfies the requirement. A resolution miss,
    /// reported to the caller, not a fatal error.
    #[error("no installed version of '{package}' satisfies '{requirement}'")]
    NoMatch {
        package: String,
        requirement: String,
    },
}

/// A named release track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The default release track.
    Stable,
    /// Pre-release builds.
    Beta,
    /// Unstable daily builds.
    Nightly,
}

impl Channel {
    /// Detect a channel token. Returns `None` for anything that is not
    /// exactly a known token; such specs are version constraints instead.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "stable" => Some(Self::Stable),
            "beta" => Some(Self::Beta),
            "nightly" => Some(Self::Nightly),
            _ => None,
        }
    }

    /// Returns the channel token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::Nightly => "nightly",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown channel token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown channel '{0}', expected one of: stable, beta, nightly")]
pub struct UnknownChannel(pub String);

impl std::str::FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Parse a version requirement string.
///
/// Bare versions (`"1.2"`) are treated as caret requirements, matching the
/// manifest convention.
///
/// # Errors
///
/// Returns `ResolveError::InvalidRequirement` on bad syntax.
pub fn parse_requirement(package: &str, spec: &str) -> Result<VersionReq, ResolveError> {
    let normalized = if spec.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("^{spec}")
    } else {
        spec.to_string()
    };

    VersionReq::parse(&normalized).map_err(|e| ResolveError::InvalidRequirement {
        package: package.to_string(),
        requirement: spec.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve a version spec to a concrete installed version.
///
/// When several installed versions satisfy the constraint, the highest one
/// wins.
///
/// # Errors
///
/// Returns `ResolveError::NoMatch` when nothing installed satisfies the
/// spec, or `ResolveError::InvalidRequirement` on bad syntax.
pub fn resolve_exact(
    package_id: &str,
    spec: &str,
    index: &dyn InstalledIndex,
) -> Result<InstalledVersion, ResolveError> {
    let req = parse_requirement(package_id, spec)?;

    let mut matching: Vec<InstalledVersion> = index
        .lookup(package_id)
        .into_iter()
        .filter(|iv| req.matches(&iv.version))
        .collect();
    matching.sort_by(|a, b| a.version.cmp(&b.version));

    matching.pop().ok_or_else(|| ResolveError::NoMatch {
        package: package_id.to_string(),
        requirement: spec.to_string(),
    })
}

/// The default descriptor for a bare load: the highest installed version of
/// the package, whatever its channel. `None` when nothing is installed.
#[must_use]
pub fn resolve_default(package_id: &str, index: &dyn InstalledIndex) -> Option<InstalledVersion> {
    index
        .lookup(package_id)
        .into_iter()
        .max_by(|a, b| a.version.cmp(&b.version))
}
