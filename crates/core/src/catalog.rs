//! Plugin catalog boundary
//!
//! A [`PluginCatalog`] is the secret-management server's view of registered
//! plugins. The sync engine logs in once, receives an immutable [`Session`],
//! and passes it by reference to every subsequent call.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;
use crate::manifest::ArtifactRecord;

/// Capability type of a plugin, as understood by the Vault catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginType {
    /// Auth method plugin
    Auth,
    /// Database secrets plugin
    Database,
    /// Secrets engine plugin
    Secret,
}

impl PluginType {
    /// Every type known to this build
    pub const ALL: [Self; 3] = [Self::Auth, Self::Database, Self::Secret];

    /// Catalog path segment for this type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Database => "database",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Self::Auth),
            "database" => Ok(Self::Database),
            "secret" => Ok(Self::Secret),
            other => Err(format!("'{other}' is not a valid plugin type")),
        }
    }
}

/// An authenticated session with the catalog server
///
/// Cheap to share by reference; the token never shows up in `Debug` output.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
}

impl Session {
    /// Wrap a client token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    /// The raw client token, for request headers
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// How catalog names are derived from manifest entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationKey {
    /// Register under the artifact filename
    ///
    /// Two plugins that share a filename end up under the same catalog name.
    #[default]
    Filename,
    /// Register under `<plugin name>-<architecture>`
    PluginArch,
}

impl RegistrationKey {
    /// The catalog name for an artifact
    #[must_use]
    pub fn name_for(self, record: &ArtifactRecord) -> String {
        match self {
            Self::Filename => record.artifact.clone(),
            Self::PluginArch => format!("{}-{}", record.plugin_name, record.architecture),
        }
    }
}

impl FromStr for RegistrationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filename" => Ok(Self::Filename),
            "plugin-arch" => Ok(Self::PluginArch),
            other => Err(format!(
                "unknown registration key '{other}' (expected 'filename' or 'plugin-arch')"
            )),
        }
    }
}

/// A verified artifact, ready to be written to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEntry {
    /// Catalog name
    pub name: String,
    /// Capability type
    pub plugin_type: PluginType,
    /// Hex SHA-256 of the downloaded binary
    pub sha256: String,
    /// Executable name inside the plugin directory
    pub command: String,
    /// Pass-through version string
    pub version: String,
}

impl RegistrationEntry {
    /// Build the entry for a fetched and hashed artifact
    #[must_use]
    pub fn new(
        record: &ArtifactRecord,
        plugin_type: PluginType,
        sha256: String,
        key: RegistrationKey,
    ) -> Self {
        Self {
            name: key.name_for(record),
            plugin_type,
            sha256,
            command: record.artifact.clone(),
            version: record.version.clone(),
        }
    }
}

/// Secret-management server catalog operations
#[async_trait]
pub trait PluginCatalog: Send + Sync {
    /// Log in as `identity`. Called exactly once per run.
    async fn authenticate(&self, identity: &str) -> Result<Session, CatalogError>;

    /// Capability types the server advertises.
    async fn plugin_types(&self, session: &Session) -> Result<BTreeSet<PluginType>, CatalogError>;

    /// Write one entry to the catalog. Not retried.
    async fn register(
        &self,
        session: &Session,
        entry: &RegistrationEntry,
    ) -> Result<(), CatalogError>;
}
