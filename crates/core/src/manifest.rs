//! Declarative plugin manifest
//!
//! The manifest names the object store holding the plugin binaries, the
//! directory Vault loads plugins from, and every plugin with its version,
//! capability type and architecture-to-artifact mapping:
//!
//! ```yaml
//! store-location:
//!   endpoint: minio.example.com:9000
//!   bucket: vault-plugins
//!   access-key: AKIA...
//!   secret-key: ...
//! plugin-directory: /vault/plugins
//! plugins:
//!   vault-plugin-x:
//!     version: 1.2.0
//!     type: secret
//!     arch:
//!       amd64: plugin-x-amd64
//!       arm64: plugin-x-arm64
//! ```
//!
//! The older layout with an `s3` section (`token`/`key` credentials) and the
//! plugin directory nested as `vault.plugin-dir` is accepted as well.

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";

/// Desired state for one synchronization run
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Where the artifacts live
    pub store: StoreLocation,
    /// Directory the artifacts are downloaded into
    pub plugin_directory: PathBuf,
    /// Plugins keyed by name, in document order
    pub plugins: IndexMap<String, PluginSpec>,
}

/// Object store coordinates and credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreLocation {
    /// Host (and optional port or scheme) of the S3-compatible endpoint
    pub endpoint: String,

    /// Bucket holding the artifacts
    pub bucket: String,

    /// Access key id
    #[serde(alias = "token", deserialize_with = "deserialize_secret")]
    pub access_key: SecretString,

    /// Secret access key
    #[serde(alias = "key", deserialize_with = "deserialize_secret")]
    pub secret_key: SecretString,

    /// Signing region (defaults to "us-east-1")
    #[serde(default)]
    pub region: Option<String>,

    /// Use TLS when the endpoint has no explicit scheme
    #[serde(default = "default_true")]
    pub secure: bool,
}

impl StoreLocation {
    /// The signing region, falling back to `us-east-1`
    #[must_use]
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// The endpoint as a URL, adding a scheme from `secure` when missing
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if self.secure {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        }
    }
}

/// A single plugin entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginSpec {
    /// Version string, passed through to registration untouched
    #[serde(default)]
    pub version: String,

    /// Capability type tag (auth, database, secret)
    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Architecture id -> artifact filename
    #[serde(default)]
    pub arch: IndexMap<String, String>,
}

/// One plugin built for one architecture, ready to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Manifest key of the plugin
    pub plugin_name: String,
    /// Pass-through version
    pub version: String,
    /// Raw capability type from the manifest
    pub plugin_type: String,
    /// Architecture id of this entry
    pub architecture: String,
    /// Object key in the bucket, also the local filename
    pub artifact: String,
    /// Download destination
    pub local_path: PathBuf,
}

impl Manifest {
    /// Read and parse a manifest file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestUnreadable`] if the file cannot be read and
    /// [`Error::ManifestMalformed`] if it does not have the expected shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::manifest_unreadable(path, e))?;
        let manifest = Self::parse(&content, path)?;
        debug!(
            path = %path.display(),
            plugins = manifest.plugins.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse a manifest from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestMalformed`] if the text does not have the
    /// expected shape.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(content)
            .map_err(|e| Error::manifest_malformed(path, e.to_string()))?;

        let plugin_directory = raw
            .plugin_directory
            .or_else(|| raw.vault.and_then(|v| v.plugin_dir))
            .ok_or_else(|| {
                Error::manifest_malformed(path, "missing `plugin-directory` (or `vault.plugin-dir`)")
            })?;

        Ok(Self {
            store: raw.store_location,
            plugin_directory,
            plugins: raw.plugins.unwrap_or_default(),
        })
    }

    /// Local destination for an artifact filename
    #[must_use]
    pub fn local_path(&self, artifact: &str) -> PathBuf {
        self.plugin_directory.join(artifact)
    }

    /// Every (plugin, architecture, artifact) triple in document order
    pub fn artifacts(&self) -> impl Iterator<Item = ArtifactRecord> + '_ {
        self.plugins.iter().flat_map(move |(name, spec)| {
            spec.arch.iter().map(move |(arch, artifact)| ArtifactRecord {
                plugin_name: name.clone(),
                version: spec.version.clone(),
                plugin_type: spec.plugin_type.clone(),
                architecture: arch.clone(),
                artifact: artifact.clone(),
                local_path: self.local_path(artifact),
            })
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    #[serde(alias = "s3")]
    store_location: StoreLocation,
    #[serde(default)]
    plugin_directory: Option<PathBuf>,
    #[serde(default)]
    vault: Option<LegacyVaultSection>,
    #[serde(default)]
    plugins: Option<IndexMap<String, PluginSpec>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LegacyVaultSection {
    #[serde(default)]
    plugin_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
