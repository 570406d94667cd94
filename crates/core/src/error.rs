//! Error types for plugin synchronization
//!
//! Errors come in two tiers. [`Error`] aborts the whole run: nothing can be
//! registered without a manifest, a store client and a Vault session. The
//! per-entry errors ([`FetchError`], [`DigestError`], [`CatalogError`], unified
//! in [`EntryError`]) only ever skip the artifact they belong to.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal errors that terminate a synchronization run
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The manifest file could not be read
    #[error("Failed to read manifest {}", path.display())]
    #[diagnostic(
        code(plugsync::manifest::unreadable),
        help("Check that the CONFIG path points to a mounted, readable file")
    )]
    ManifestUnreadable {
        /// Manifest path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be parsed into the expected structure
    #[error("Malformed manifest {}: {message}", path.display())]
    #[diagnostic(code(plugsync::manifest::malformed))]
    ManifestMalformed {
        /// Manifest path (or `<inline>` for string input)
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Logging in to the secret-management server failed
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(plugsync::auth::failed),
        help("Verify the service account role is bound to the Vault auth mount")
    )]
    Authentication {
        /// Error message from the catalog client
        message: String,
    },

    /// The object store client could not be constructed
    #[error("Failed to initialize object store client: {message}")]
    #[diagnostic(code(plugsync::store::client))]
    StoreClient {
        /// Error message
        message: String,
    },

    /// Invalid bootstrap configuration
    #[error("Configuration error: {message}")]
    #[diagnostic(code(plugsync::config::invalid))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl Error {
    /// Create a manifest-unreadable error
    #[must_use]
    pub fn manifest_unreadable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ManifestUnreadable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a manifest-malformed error
    #[must_use]
    pub fn manifest_malformed(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::ManifestMalformed {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a store client error
    #[must_use]
    pub fn store_client(message: impl Into<String>) -> Self {
        Self::StoreClient {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for fatal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from fetching an artifact out of the object store
#[derive(Error, Debug, Diagnostic)]
pub enum FetchError {
    /// The object does not exist in the bucket
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    #[diagnostic(code(plugsync::fetch::not_found))]
    NotFound {
        /// Bucket name
        bucket: String,
        /// Object key
        key: String,
    },

    /// The store could not be reached or the transfer broke off
    #[error("Transport error fetching '{key}': {message}")]
    #[diagnostic(code(plugsync::fetch::transport))]
    Transport {
        /// Object key
        key: String,
        /// Error message from the store client
        message: String,
    },

    /// Writing the local file failed
    #[error("Failed to write {}", path.display())]
    #[diagnostic(
        code(plugsync::fetch::local_write),
        help("Check that the plugin directory exists and is writable")
    )]
    LocalWrite {
        /// Destination path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Create a not-found error
    #[must_use]
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a local write error
    #[must_use]
    pub fn local_write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::LocalWrite {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Errors from computing a file digest
#[derive(Error, Debug, Diagnostic)]
pub enum DigestError {
    /// The file could not be opened or read
    #[error("Could not read {} for hashing", path.display())]
    #[diagnostic(code(plugsync::digest::unreadable))]
    FileUnreadable {
        /// File path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by a plugin catalog client
#[derive(Error, Debug, Diagnostic)]
pub enum CatalogError {
    /// Login was refused or returned no session
    #[error("Authentication failed: {message}")]
    #[diagnostic(code(plugsync::catalog::auth))]
    AuthFailure {
        /// Error message
        message: String,
    },

    /// The server answered with a non-success status
    #[error("Server rejected request ({status}): {message}")]
    #[diagnostic(code(plugsync::catalog::rejected))]
    ServerRejected {
        /// HTTP status code
        status: u16,
        /// Server error message
        message: String,
    },

    /// The server could not be reached or answered unintelligibly
    #[error("Transport error: {message}")]
    #[diagnostic(code(plugsync::catalog::transport))]
    Transport {
        /// Error message
        message: String,
    },
}

impl CatalogError {
    /// Create an authentication failure
    #[must_use]
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::AuthFailure {
            message: message.into(),
        }
    }

    /// Create a server rejection
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::ServerRejected {
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Any recoverable failure while processing a single artifact
#[derive(Error, Debug, Diagnostic)]
pub enum EntryError {
    /// Download failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    /// Hashing failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Digest(#[from] DigestError),

    /// The capability type is not one the server understands
    #[error("Unknown plugin type '{plugin_type}'")]
    #[diagnostic(
        code(plugsync::entry::type_unknown),
        help("Supported types are auth, database and secret")
    )]
    TypeUnknown {
        /// The type string from the manifest
        plugin_type: String,
    },

    /// Registration was rejected or could not be delivered
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),
}

impl EntryError {
    /// Create an unknown-type error
    #[must_use]
    pub fn type_unknown(plugin_type: impl Into<String>) -> Self {
        Self::TypeUnknown {
            plugin_type: plugin_type.into(),
        }
    }
}
