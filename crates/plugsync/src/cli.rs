//! Command-line and environment configuration
//!
//! Every flag can also be set through the environment variable named in its
//! help text, which is how the sidecar is usually configured in a pod spec.

use clap::{Parser, ValueEnum};
use plugsync_core::{DEFAULT_ARCH, DEFAULT_IDENTITY, RegistrationKey, SyncOptions, SyncReport};
use plugsync_vault::{DEFAULT_JWT_PATH, VaultSettings};
use std::path::PathBuf;

/// Exit codes for the binary
pub const EXIT_OK: i32 = 0;
/// A fatal error stopped the run
pub const EXIT_FATAL: i32 = 1;
/// `--strict` was set and at least one entry was skipped
pub const EXIT_SKIPPED: i32 = 3;

/// Log output format
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Sync plugin binaries from object storage and register them in Vault
#[derive(Parser, Debug)]
#[command(name = "plugsync")]
#[command(version)]
pub struct Cli {
    /// Path to the plugin manifest (YAML)
    #[arg(long, env = "CONFIG", value_name = "PATH")]
    pub config: PathBuf,

    /// Vault server address
    #[arg(long, env = "VAULT_ADDR", value_name = "URL")]
    pub vault_addr: String,

    /// Vault role used for Kubernetes login
    #[arg(long, env = "SA_NAME", default_value = DEFAULT_IDENTITY)]
    pub service_account: String,

    /// Host architecture to select artifacts for
    #[arg(long, env = "ARCH", default_value = DEFAULT_ARCH)]
    pub arch: String,

    /// Mount point of the Kubernetes auth method
    #[arg(long, env = "VAULT_AUTH_MOUNT", default_value = "kubernetes")]
    pub auth_mount: String,

    /// Service account token presented at login
    #[arg(long, env = "VAULT_K8S_TOKEN_PATH", default_value = DEFAULT_JWT_PATH, value_name = "PATH")]
    pub jwt_path: PathBuf,

    /// Vault Enterprise namespace
    #[arg(long, env = "VAULT_NAMESPACE")]
    pub vault_namespace: Option<String>,

    /// Catalog name: the artifact filename or `<plugin>-<arch>`
    #[arg(long, env = "REGISTRATION_KEY", default_value = "filename", value_name = "filename|plugin-arch")]
    pub registration_key: RegistrationKey,

    /// Number of artifacts processed at once
    #[arg(long, env = "SYNC_CONCURRENCY", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Exit with status 3 when any artifact was skipped
    #[arg(long, env = "SYNC_STRICT")]
    pub strict: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Orchestrator options for this invocation
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            host_arch: self.arch.clone(),
            identity: self.service_account.clone(),
            registration_key: self.registration_key,
            concurrency: usize::from(self.concurrency),
        }
    }

    /// Vault connection settings for this invocation
    #[must_use]
    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            address: self.vault_addr.clone(),
            auth_mount: self.auth_mount.clone(),
            jwt_path: self.jwt_path.clone(),
            namespace: self.vault_namespace.clone(),
        }
    }

    /// Exit code for a completed run
    #[must_use]
    pub fn exit_code(&self, report: &SyncReport) -> i32 {
        if self.strict && !report.is_clean() {
            EXIT_SKIPPED
        } else {
            EXIT_OK
        }
    }
}
