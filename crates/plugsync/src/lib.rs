//! plugsync sidecar
//!
//! Wires the manifest, the S3 store and the Vault catalog together for a
//! single synchronization pass. The binary in `main.rs` only parses
//! arguments, installs logging and maps the outcome to an exit code.

pub mod cli;
pub mod logging;

pub use cli::{Cli, EXIT_FATAL, EXIT_OK, EXIT_SKIPPED, LogFormat};

use plugsync_core::{Manifest, PluginSync, Result, SyncReport};
use plugsync_s3::S3Store;
use plugsync_vault::VaultCatalog;
use tracing::info;

/// Run one synchronization pass as configured by `cli`
///
/// The manifest is read and the store client built before any login, so a
/// broken manifest never reaches Vault.
///
/// # Errors
///
/// Returns the fatal error that stopped the run: an unreadable or malformed
/// manifest, an invalid store or Vault configuration, or a failed login.
pub async fn run(cli: &Cli) -> Result<SyncReport> {
    let manifest = Manifest::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        plugins = manifest.plugins.len(),
        plugin_dir = %manifest.plugin_directory.display(),
        "Loaded plugin manifest"
    );

    let store = S3Store::new(&manifest.store)?;
    let catalog = VaultCatalog::new(cli.vault_settings())?;

    PluginSync::new(&manifest, &store, &catalog, cli.sync_options())
        .run()
        .await
}
