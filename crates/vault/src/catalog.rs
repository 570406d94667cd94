//! `HashiCorp` Vault plugin catalog over the HTTP API
//!
//! Login uses the Kubernetes auth method: the pod's service account JWT is
//! exchanged for a client token, which then authorizes catalog calls.

use async_trait::async_trait;
use plugsync_core::{CatalogError, Error, PluginCatalog, PluginType, RegistrationEntry, Session};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, trace};

/// Default service account token mounted into every pod
pub const DEFAULT_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Connection settings for a Vault server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    /// Server address (e.g., "https://vault.vault.svc:8200")
    pub address: String,

    /// Mount point of the Kubernetes auth method (defaults to "kubernetes")
    #[serde(default = "default_auth_mount")]
    pub auth_mount: String,

    /// File holding the service account JWT
    #[serde(default = "default_jwt_path")]
    pub jwt_path: PathBuf,

    /// Enterprise namespace, sent as `X-Vault-Namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

fn default_auth_mount() -> String {
    "kubernetes".to_string()
}

fn default_jwt_path() -> PathBuf {
    PathBuf::from(DEFAULT_JWT_PATH)
}

impl VaultSettings {
    /// Settings for `address` with default mount and token path
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            auth_mount: default_auth_mount(),
            jwt_path: default_jwt_path(),
            namespace: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address.trim_end_matches('/'), path)
    }
}

/// Vault-backed [`PluginCatalog`]
pub struct VaultCatalog {
    http: Client,
    settings: VaultSettings,
}

impl std::fmt::Debug for VaultCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCatalog")
            .field("address", &self.settings.address)
            .field("auth_mount", &self.settings.auth_mount)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    role: &'a str,
    jwt: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<AuthInfo>,
}

#[derive(Deserialize)]
struct AuthInfo {
    client_token: String,
}

#[derive(Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    data: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    sha256: &'a str,
    command: &'a str,
    version: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultCatalog {
    /// Create a catalog client
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the address is not an HTTP(S) URL
    /// or the HTTP client cannot be built.
    pub fn new(settings: VaultSettings) -> Result<Self, Error> {
        if !(settings.address.starts_with("http://") || settings.address.starts_with("https://")) {
            return Err(Error::configuration(format!(
                "Vault address '{}' must start with http:// or https://",
                settings.address
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("plugsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create Vault client: {e}")))?;

        Ok(Self { http, settings })
    }

    fn request(&self, builder: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
        let builder = match &self.settings.namespace {
            Some(ns) => builder.header(NAMESPACE_HEADER, ns),
            None => builder,
        };
        match session {
            Some(session) => builder.header(TOKEN_HEADER, session.token()),
            None => builder,
        }
    }

    async fn read_jwt(&self) -> Result<String, CatalogError> {
        let jwt = tokio::fs::read_to_string(&self.settings.jwt_path)
            .await
            .map_err(|e| {
                CatalogError::auth_failure(format!(
                    "unable to read service account token {}: {e}",
                    self.settings.jwt_path.display()
                ))
            })?;
        Ok(jwt.trim().to_string())
    }
}

/// Turn a non-success response into a message, preferring Vault's `errors`
async fn error_message(response: Response) -> (u16, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorResponse = serde_json::from_str(&body).unwrap_or_default();

    let message = if !parsed.errors.is_empty() {
        parsed.errors.join("; ")
    } else if !body.trim().is_empty() {
        body.trim().to_string()
    } else {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    };
    (status.as_u16(), message)
}

#[async_trait]
impl PluginCatalog for VaultCatalog {
    async fn authenticate(&self, identity: &str) -> Result<Session, CatalogError> {
        let jwt = self.read_jwt().await?;
        let url = self
            .settings
            .url(&format!("auth/{}/login", self.settings.auth_mount));
        debug!(%url, role = identity, "Logging in to Vault");

        let response = self
            .request(self.http.post(&url), None)
            .json(&LoginRequest {
                role: identity,
                jwt: &jwt,
            })
            .send()
            .await
            .map_err(|e| CatalogError::auth_failure(format!("unable to reach Vault: {e}")))?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(CatalogError::auth_failure(format!(
                "login rejected ({status}): {message}"
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::auth_failure(format!("invalid login response: {e}")))?;

        login
            .auth
            .map(|auth| Session::new(auth.client_token))
            .ok_or_else(|| CatalogError::auth_failure("no auth info was returned after login"))
    }

    async fn plugin_types(&self, session: &Session) -> Result<BTreeSet<PluginType>, CatalogError> {
        let url = self.settings.url("sys/plugins/catalog");
        let response = self
            .request(self.http.get(&url), Some(session))
            .send()
            .await
            .map_err(|e| CatalogError::transport(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(CatalogError::rejected(status, message));
        }

        let catalog: CatalogResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::transport(format!("invalid catalog response: {e}")))?;

        let types: BTreeSet<PluginType> = catalog
            .data
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect();
        trace!(?types, "Catalog plugin types");
        Ok(types)
    }

    async fn register(
        &self,
        session: &Session,
        entry: &RegistrationEntry,
    ) -> Result<(), CatalogError> {
        let url = self.settings.url(&format!(
            "sys/plugins/catalog/{}/{}",
            entry.plugin_type, entry.name
        ));
        debug!(%url, version = %entry.version, "Registering plugin");

        let response = self
            .request(self.http.put(&url), Some(session))
            .json(&RegisterRequest {
                sha256: &entry.sha256,
                command: &entry.command,
                version: &entry.version,
            })
            .send()
            .await
            .map_err(|e| CatalogError::transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let (status, message) = error_message(response).await;
            Err(CatalogError::rejected(status, message))
        }
    }
}
