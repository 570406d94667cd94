//! S3 integration for plugsync
//!
//! This crate provides an [`ObjectStore`](plugsync_core::ObjectStore) backed by
//! any S3-compatible service (AWS S3, MinIO, Ceph RGW) via the AWS SDK.

pub mod store;

// Re-export main types for convenience
pub use store::S3Store;
