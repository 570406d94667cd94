//! Plugin synchronization run
//!
//! A run authenticates once, then walks every architecture entry of every
//! plugin. Entries for other architectures are ignored; matching ones go
//! through fetch, digest, type validation and registration. A failure at any
//! of those stages skips that entry only. Authentication is the single
//! failure that aborts the run.

use futures::StreamExt;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use crate::catalog::{PluginCatalog, PluginType, RegistrationEntry, RegistrationKey, Session};
use crate::digest::digest_file;
use crate::error::{CatalogError, EntryError};
use crate::manifest::{ArtifactRecord, Manifest};
use crate::store::{ObjectStore, fetch_artifact};
use crate::{Error, Result};

/// Architecture assumed when the host does not report one
pub const DEFAULT_ARCH: &str = "amd64";

/// Login identity used when none is configured
pub const DEFAULT_IDENTITY: &str = "vault-plugin-sidecar";

/// Options resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Host architecture, matched exactly against manifest keys
    pub host_arch: String,
    /// Identity (Vault role) to authenticate as
    pub identity: String,
    /// How catalog names are derived
    pub registration_key: RegistrationKey,
    /// Maximum number of entries processed at once
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            host_arch: DEFAULT_ARCH.to_string(),
            identity: DEFAULT_IDENTITY.to_string(),
            registration_key: RegistrationKey::default(),
            concurrency: 1,
        }
    }
}

/// Per-entry pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Downloading from the object store
    Fetching,
    /// Hashing the downloaded file
    Verifying,
    /// Checking the capability type
    Validating,
    /// Writing the catalog entry
    Registering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "fetch",
            Self::Verifying => "verify",
            Self::Validating => "validate",
            Self::Registering => "register",
        })
    }
}

/// What happened to one matching entry
#[derive(Debug)]
pub enum EntryOutcome {
    /// Fetched, verified and registered
    Registered {
        /// The artifact
        record: ArtifactRecord,
        /// What was submitted
        entry: RegistrationEntry,
    },
    /// Abandoned at `stage`
    Skipped {
        /// The artifact
        record: ArtifactRecord,
        /// Where it failed
        stage: Stage,
        /// Why it failed
        error: EntryError,
    },
}

impl EntryOutcome {
    /// The artifact this outcome is about
    #[must_use]
    pub fn record(&self) -> &ArtifactRecord {
        match self {
            Self::Registered { record, .. } | Self::Skipped { record, .. } => record,
        }
    }

    /// Whether the entry made it into the catalog
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

/// Result of a completed run
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Outcomes of matching entries, in manifest order
    pub outcomes: Vec<EntryOutcome>,
    /// Entries ignored because their architecture did not match
    pub ignored: usize,
}

impl SyncReport {
    /// Number of registered entries
    #[must_use]
    pub fn registered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_registered()).count()
    }

    /// Number of skipped entries
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.registered()
    }

    /// True when no matching entry was skipped
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped() == 0
    }
}

/// Drives one synchronization pass over a manifest
pub struct PluginSync<'a> {
    manifest: &'a Manifest,
    store: &'a dyn ObjectStore,
    catalog: &'a dyn PluginCatalog,
    options: SyncOptions,
}

impl<'a> PluginSync<'a> {
    /// Create a run over `manifest` using the given collaborators
    #[must_use]
    pub fn new(
        manifest: &'a Manifest,
        store: &'a dyn ObjectStore,
        catalog: &'a dyn PluginCatalog,
        options: SyncOptions,
    ) -> Self {
        Self {
            manifest,
            store,
            catalog,
            options,
        }
    }

    /// Run the synchronization to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if login fails. Every other failure is
    /// recorded in the returned [`SyncReport`].
    pub async fn run(&self) -> Result<SyncReport> {
        let session = self
            .catalog
            .authenticate(&self.options.identity)
            .await
            .map_err(|e| match e {
                CatalogError::AuthFailure { message } => Error::authentication(message),
                other => Error::authentication(other.to_string()),
            })?;
        info!(identity = %self.options.identity, "Authenticated with plugin catalog");

        let supported = self.supported_types(&session).await;

        let mut ignored = 0;
        let mut matching = Vec::new();
        for record in self.manifest.artifacts() {
            info!(
                plugin = %record.plugin_name,
                version = %record.version,
                plugin_type = %record.plugin_type,
                arch = %record.architecture,
                artifact = %record.artifact,
                "Processing plugin"
            );
            if record.architecture == self.options.host_arch {
                matching.push(record);
            } else {
                debug!(
                    plugin = %record.plugin_name,
                    arch = %record.architecture,
                    host_arch = %self.options.host_arch,
                    "Architecture does not match host, ignoring"
                );
                ignored += 1;
            }
        }

        self.warn_name_collisions(&matching);

        let outcomes: Vec<EntryOutcome> = futures::stream::iter(matching)
            .map(|record| self.process(record, &session, &supported))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let report = SyncReport { outcomes, ignored };
        info!(
            registered = report.registered(),
            skipped = report.skipped(),
            ignored = report.ignored,
            "Plugin sync finished"
        );
        Ok(report)
    }

    fn warn_name_collisions(&self, matching: &[ArtifactRecord]) {
        for (name, record, first) in name_collisions(self.options.registration_key, matching) {
            warn!(
                name = %name,
                plugin_type = %record.plugin_type,
                plugin = %record.plugin_name,
                other_plugin = %first,
                "Catalog name used by more than one plugin, the later registration wins"
            );
        }
    }

    async fn supported_types(&self, session: &Session) -> BTreeSet<PluginType> {
        match self.catalog.plugin_types(session).await {
            Ok(types) if !types.is_empty() => {
                debug!(?types, "Server plugin types");
                types
            }
            Ok(_) => {
                warn!("Server advertised no plugin types, accepting all known types");
                PluginType::ALL.into_iter().collect()
            }
            Err(e) => {
                warn!(error = %e, "Could not list server plugin types, accepting all known types");
                PluginType::ALL.into_iter().collect()
            }
        }
    }

    async fn process(
        &self,
        record: ArtifactRecord,
        session: &Session,
        supported: &BTreeSet<PluginType>,
    ) -> EntryOutcome {
        match self.sync_artifact(&record, session, supported).await {
            Ok(entry) => {
                info!(
                    plugin = %record.plugin_name,
                    arch = %record.architecture,
                    artifact = %record.artifact,
                    name = %entry.name,
                    sha256 = %entry.sha256,
                    "Registered plugin"
                );
                EntryOutcome::Registered { record, entry }
            }
            Err((stage, error)) => {
                warn!(
                    plugin = %record.plugin_name,
                    arch = %record.architecture,
                    artifact = %record.artifact,
                    %stage,
                    error = %error,
                    "Skipping artifact"
                );
                EntryOutcome::Skipped {
                    record,
                    stage,
                    error,
                }
            }
        }
    }

    async fn sync_artifact(
        &self,
        record: &ArtifactRecord,
        session: &Session,
        supported: &BTreeSet<PluginType>,
    ) -> std::result::Result<RegistrationEntry, (Stage, EntryError)> {
        fetch_artifact(
            self.store,
            &self.manifest.store.bucket,
            &record.artifact,
            &record.local_path,
        )
        .await
        .map_err(|e| (Stage::Fetching, e.into()))?;

        let sha256 = digest_file(&record.local_path)
            .await
            .map_err(|e| (Stage::Verifying, e.into()))?;

        let plugin_type =
            parse_plugin_type(&record.plugin_type, supported).map_err(|e| (Stage::Validating, e))?;

        let entry = RegistrationEntry::new(record, plugin_type, sha256, self.options.registration_key);
        self.catalog
            .register(session, &entry)
            .await
            .map_err(|e| (Stage::Registering, e.into()))?;

        Ok(entry)
    }
}

/// Entries that overwrite an earlier entry of the same type and catalog name,
/// with the name and the plugin that claimed it first
fn name_collisions(
    key: RegistrationKey,
    matching: &[ArtifactRecord],
) -> Vec<(String, &ArtifactRecord, &str)> {
    let mut seen: HashMap<(&str, String), &str> = HashMap::new();
    let mut collisions = Vec::new();
    for record in matching {
        let name = key.name_for(record);
        match seen.get(&(record.plugin_type.as_str(), name.clone())) {
            Some(first) => collisions.push((name, record, *first)),
            None => {
                seen.insert((record.plugin_type.as_str(), name), &record.plugin_name);
            }
        }
    }
    collisions
}

fn parse_plugin_type(
    raw: &str,
    supported: &BTreeSet<PluginType>,
) -> std::result::Result<PluginType, EntryError> {
    raw.parse::<PluginType>()
        .ok()
        .filter(|t| supported.contains(t))
        .ok_or_else(|| EntryError::type_unknown(raw))
}
