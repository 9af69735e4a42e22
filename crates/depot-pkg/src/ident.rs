//! Package identifier parsing.
//!
//! Identifiers are the wire format of the resolver: consumers pass strings,
//! never structured values. Two forms are accepted:
//!
//! - Registry-relative: `<package_id>[#<version_or_channel>][#<content_id>]`
//!   (e.g. `caldav`, `caldav#beta`, `caldav#>=1.2`, `caldav#1.2#9f3a...`)
//! - Object-store: `<package_id>.<object_id>/<content_id>`
//!   (e.g. `caldav.ob9210/9f3a...`), which addresses an immutable artifact
//!   directly and bypasses version resolution.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while parsing a package identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    /// The package id portion is empty.
    #[error("empty package id in '{0}'")]
    EmptyPackageId(String),

    /// The package id contains characters outside `[A-Za-z0-9._-]` or does
    /// not start with an alphanumeric character.
    #[error("invalid package id '{id}' in '{raw}': {reason}")]
    InvalidPackageId {
        raw: String,
        id: String,
        reason: &'static str,
    },

    /// The string mixes separators in a way neither grammar form allows.
    #[error("unsupported separator sequence in '{0}'")]
    UnsupportedSeparators(String),

    /// A `#`- or `/`-delimited segment is empty.
    #[error("empty segment in '{0}'")]
    EmptySegment(String),
}

/// A parsed package identifier.
///
/// If `content_id` is present the identifier addresses one immutable
/// artifact; any `version_spec` it also carries is ignored by resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdent {
    /// The package name.
    pub package_id: String,

    /// Version constraint or channel token, verbatim from the input.
    pub version_spec: Option<String>,

    /// Object-store bucket, only present for the object-store form.
    pub object_id: Option<String>,

    /// Content id addressing a specific immutable artifact.
    pub content_id: Option<String>,
}

impl PackageIdent {
    /// Parse an identifier string. Pure; performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if the package id is empty or invalid, a segment is
    /// empty, or the separator layout matches neither grammar form.
    pub fn parse(raw: &str) -> Result<Self, IdentError> {
        if raw.contains('/') {
            Self::parse_object_form(raw)
        } else {
            Self::parse_registry_form(raw)
        }
    }

    /// `<package_id>.<object_id>/<content_id>`
    fn parse_object_form(raw: &str) -> Result<Self, IdentError> {
        if raw.contains('#') {
            return Err(IdentError::UnsupportedSeparators(raw.to_string()));
        }

        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() != 2 {
            return Err(IdentError::UnsupportedSeparators(raw.to_string()));
        }
        let (left, content_id) = (parts[0], parts[1]);
        if content_id.is_empty() {
            return Err(IdentError::EmptySegment(raw.to_string()));
        }

        // The bucket is everything after the last dot; package ids may
        // themselves contain dots.
        let dot = left
            .rfind('.')
            .ok_or_else(|| IdentError::UnsupportedSeparators(raw.to_string()))?;
        let (package_id, object_id) = (&left[..dot], &left[dot + 1..]);
        if object_id.is_empty() {
            return Err(IdentError::EmptySegment(raw.to_string()));
        }
        validate_package_id(raw, package_id)?;

        Ok(Self {
            package_id: package_id.to_string(),
            version_spec: None,
            object_id: Some(object_id.to_string()),
            content_id: Some(content_id.to_string()),
        })
    }

    /// `<package_id>[#<version_or_channel>][#<content_id>]`
    fn parse_registry_form(raw: &str) -> Result<Self, IdentError> {
        let parts: Vec<&str> = raw.split('#').collect();
        if parts.len() > 3 {
            return Err(IdentError::UnsupportedSeparators(raw.to_string()));
        }

        validate_package_id(raw, parts[0])?;

        let version_spec = match parts.get(1) {
            Some(&"") => return Err(IdentError::EmptySegment(raw.to_string())),
            Some(v) => Some((*v).to_string()),
            None => None,
        };
        let content_id = match parts.get(2) {
            Some(&"") => return Err(IdentError::EmptySegment(raw.to_string())),
            Some(c) => Some((*c).to_string()),
            None => None,
        };

        Ok(Self {
            package_id: parts[0].to_string(),
            version_spec,
            object_id: None,
            content_id,
        })
    }

    /// Returns true if this identifier addresses an artifact directly.
    #[must_use]
    pub fn is_content_addressed(&self) -> bool {
        self.content_id.is_some()
    }
}

impl fmt::Display for PackageIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref object_id) = self.object_id {
            write!(f, "{}.{}", self.package_id, object_id)?;
            if let Some(ref cid) = self.content_id {
                write!(f, "/{cid}")?;
            }
            return Ok(());
        }

        write!(f, "{}", self.package_id)?;
        if let Some(ref spec) = self.version_spec {
            write!(f, "#{spec}")?;
        }
        if let Some(ref cid) = self.content_id {
            write!(f, "#{cid}")?;
        }
        Ok(())
    }
}

fn validate_package_id(raw: &str, id: &str) -> Result<(), IdentError> {
    if id.is_empty() {
        return Err(IdentError::EmptyPackageId(raw.to_string()));
    }
    if id.len() > 100 {
        return Err(IdentError::InvalidPackageId {
            raw: raw.to_string(),
            id: id.to_string(),
            reason: "package id cannot exceed 100 characters",
        });
    }
    if !id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(IdentError::InvalidPackageId {
            raw: raw.to_string(),
            id: id.to_string(),
            reason: "package id must start with a letter or digit",
        });
    }
    for c in id.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(IdentError::InvalidPackageId {
                raw: raw.to_string(),
                id: id.to_string(),
                reason: "package id can only contain letters, numbers, dots, hyphens, and underscores",
            });
        }
    }
    Ok(())
}
