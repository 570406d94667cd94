//! Plugin synchronization engine for plugsync
//!
//! Downloads secret-management plugin binaries for the host architecture from
//! an object store, hashes them, and registers them in a plugin catalog.
//!
//! The two outside systems sit behind traits so the engine can be driven by
//! any backend:
//!
//! - [`ObjectStore`] - streamed object reads (`plugsync-s3`)
//! - [`PluginCatalog`] - login, type listing and registration (`plugsync-vault`)
//!
//! # Example
//!
//! ```ignore
//! use plugsync_core::{Manifest, PluginSync, SyncOptions};
//!
//! let manifest = Manifest::load("/etc/plugsync/plugins.yaml")?;
//! let report = PluginSync::new(&manifest, &store, &catalog, SyncOptions::default())
//!     .run()
//!     .await?;
//! println!("registered {} plugins", report.registered());
//! ```

pub mod catalog;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod store;
pub mod sync;

pub use catalog::{PluginCatalog, PluginType, RegistrationEntry, RegistrationKey, Session};
pub use digest::digest_file;
pub use error::{CatalogError, DigestError, EntryError, Error, FetchError, Result};
pub use manifest::{ArtifactRecord, Manifest, PluginSpec, StoreLocation};
pub use store::{ObjectStore, ObjectStream, fetch_artifact};
pub use sync::{
    DEFAULT_ARCH, DEFAULT_IDENTITY, EntryOutcome, PluginSync, Stage, SyncOptions, SyncReport,
};
