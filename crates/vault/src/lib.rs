//! `HashiCorp` Vault integration for plugsync
//!
//! This crate provides a [`PluginCatalog`](plugsync_core::PluginCatalog) that
//! talks to the Vault HTTP API:
//! - Kubernetes service account login
//! - Plugin catalog listing and registration via the [`catalog`] module

pub mod catalog;

// Re-export main types for convenience
pub use catalog::{DEFAULT_JWT_PATH, VaultCatalog, VaultSettings};
