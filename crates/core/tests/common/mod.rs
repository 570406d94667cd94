//! In-memory collaborators for driving `PluginSync` in tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use indexmap::IndexMap;
use plugsync_core::{
    CatalogError, FetchError, Manifest, ObjectStore, ObjectStream, PluginCatalog, PluginSpec,
    PluginType, RegistrationEntry, Session,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Calls observed across store and catalog, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Authenticate(String),
    ListTypes,
    Fetch(String),
    Register(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn fetched(log: &EventLog) -> Vec<String> {
    events(log)
        .into_iter()
        .filter_map(|e| match e {
            Event::Fetch(key) => Some(key),
            _ => None,
        })
        .collect()
}

/// Object store backed by a map of key -> bytes
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    log: EventLog,
}

impl MemoryStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn with_object(self, key: &str, content: &[u8]) -> Self {
        self.put(key, content);
        self
    }

    pub fn put(&self, key: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content.to_vec());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, FetchError> {
        self.log.lock().unwrap().push(Event::Fetch(key.to_string()));
        let content = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::not_found(bucket, key))?;

        // Two chunks, so the fetcher has to reassemble them
        let mid = content.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&content[..mid])),
            Ok(Bytes::copy_from_slice(&content[mid..])),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Catalog double that records every call
pub struct RecordingCatalog {
    log: EventLog,
    pub fail_auth: bool,
    pub reject_duplicates: bool,
    /// Catalog name whose registration fails as if the connection dropped
    pub fail_register_transport: Option<String>,
    pub types: Option<BTreeSet<PluginType>>,
    pub registered: Mutex<Vec<RegistrationEntry>>,
    pub tokens_seen: Mutex<HashSet<String>>,
}

impl RecordingCatalog {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_auth: false,
            reject_duplicates: false,
            fail_register_transport: None,
            types: Some(PluginType::ALL.into_iter().collect()),
            registered: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn registered(&self) -> Vec<RegistrationEntry> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginCatalog for RecordingCatalog {
    async fn authenticate(&self, identity: &str) -> Result<Session, CatalogError> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Authenticate(identity.to_string()));
        if self.fail_auth {
            return Err(CatalogError::auth_failure("permission denied"));
        }
        Ok(Session::new("s.test-token"))
    }

    async fn plugin_types(&self, session: &Session) -> Result<BTreeSet<PluginType>, CatalogError> {
        self.log.lock().unwrap().push(Event::ListTypes);
        self.tokens_seen
            .lock()
            .unwrap()
            .insert(session.token().to_string());
        self.types
            .clone()
            .ok_or_else(|| CatalogError::transport("connection refused"))
    }

    async fn register(
        &self,
        session: &Session,
        entry: &RegistrationEntry,
    ) -> Result<(), CatalogError> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Register(entry.name.clone()));
        self.tokens_seen
            .lock()
            .unwrap()
            .insert(session.token().to_string());

        if self.fail_register_transport.as_deref() == Some(entry.name.as_str()) {
            return Err(CatalogError::transport("connection reset by peer"));
        }

        let mut registered = self.registered.lock().unwrap();
        if self.reject_duplicates && registered.iter().any(|e| e.name == entry.name) {
            return Err(CatalogError::rejected(400, "plugin already registered"));
        }
        registered.push(entry.clone());
        Ok(())
    }
}

/// Manifest rooted at `plugin_dir` with the given plugins
pub fn manifest(plugin_dir: &Path, plugins: &[(&str, &str, &str, &[(&str, &str)])]) -> Manifest {
    let yaml = format!(
        "store-location: {{ endpoint: minio:9000, bucket: vault-plugins, access-key: a, secret-key: s }}\n\
         plugin-directory: {}\n",
        plugin_dir.display()
    );
    let mut manifest = Manifest::from_yaml_str(&yaml).unwrap();
    for (name, version, plugin_type, arch) in plugins {
        manifest.plugins.insert(
            (*name).to_string(),
            PluginSpec {
                version: (*version).to_string(),
                plugin_type: (*plugin_type).to_string(),
                arch: arch
                    .iter()
                    .map(|(a, f)| ((*a).to_string(), (*f).to_string()))
                    .collect::<IndexMap<_, _>>(),
            },
        );
    }
    manifest
}
