//! Layered package environment resolution for the Depot runtime.
//!
//! This crate provides:
//! - Parsing of package identifier strings (`name`, `name#channel`,
//!   `name#>=1.2`, `name#1.2#<cid>`, and content-addressed
//!   `name.<object>/<cid>` forms)
//! - Version and channel resolution against an installed-package index
//! - Package environments with ordered one-hop parent fallback
//! - An identity-preserving registry mapping configuration paths to
//!   environments
//!
//! Resolution picks one concrete artifact for an identifier; it is not a
//! dependency solver and never walks a dependency graph.

mod config;
mod env;
mod ident;
mod index;
mod install;
mod media;
mod registry;
mod version;

pub use config::{EnvConfig, EnvSection};
pub use env::{LoadError, PackageEnvironment, OBJECTS_DIR, PACKAGES_DIR};
pub use ident::{IdentError, PackageIdent};
pub use index::{IndexError, InstalledIndex, InstalledVersion, PackageIndex, INDEX_FILE};
pub use install::{InstallError, Installer, LocalInstaller};
pub use media::{file_digest, MediaInfo};
pub use registry::{EnvRegistry, CONFIG_FILE};
pub use version::{
    parse_requirement, resolve_default, resolve_exact, Channel, ResolveError, UnknownChannel,
};
