//! S3-compatible object store using static credentials from the manifest

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use futures::StreamExt;
use plugsync_core::{Error, FetchError, ObjectStore, ObjectStream, StoreLocation};
use secrecy::ExposeSecret;
use tracing::debug;

/// Reads artifacts from an S3-compatible endpoint
///
/// Requests use path-style addressing (`https://endpoint/bucket/key`), which
/// MinIO and most self-hosted stores require.
pub struct S3Store {
    client: Client,
    endpoint: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a client for the manifest's store location
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClient`] if the endpoint or bucket is empty.
    pub fn new(location: &StoreLocation) -> Result<Self, Error> {
        if location.endpoint.trim().is_empty() {
            return Err(Error::store_client("store endpoint is empty"));
        }
        if location.bucket.trim().is_empty() {
            return Err(Error::store_client("store bucket is empty"));
        }

        let endpoint = location.endpoint_url();
        let credentials = Credentials::new(
            location.access_key.expose_secret(),
            location.secret_key.expose_secret(),
            None,
            None,
            "plugsync-manifest",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(Region::new(location.region().to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        debug!(%endpoint, region = location.region(), "Created S3 client");
        Ok(Self {
            client: Client::from_conf(config),
            endpoint,
        })
    }

    /// The resolved endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(bucket, key, e))?;

        let key = key.to_string();
        let body = futures::stream::try_unfold(output.body, move |mut body| {
            let key = key.clone();
            async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(FetchError::transport(key, e.to_string())),
                }
            }
        });

        Ok(body.boxed())
    }
}

fn classify_error(bucket: &str, key: &str, err: SdkError<GetObjectError>) -> FetchError {
    let message = DisplayErrorContext(&err).to_string();
    if err.into_service_error().is_no_such_key() {
        FetchError::not_found(bucket, key)
    } else {
        FetchError::transport(key, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugsync_core::{Manifest, fetch_artifact};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn location(endpoint: &str) -> StoreLocation {
        let yaml = format!(
            "store-location: {{ endpoint: '{endpoint}', bucket: vault-plugins, access-key: AKIATEST, secret-key: secret }}\n\
             plugin-directory: /vault/plugins\n"
        );
        Manifest::from_yaml_str(&yaml).unwrap().store
    }

    #[test]
    fn test_new_uses_https_for_bare_endpoint() {
        let store = S3Store::new(&location("minio.internal:9000")).unwrap();
        assert_eq!(store.endpoint(), "https://minio.internal:9000");
    }

    #[test]
    fn test_new_rejects_empty_endpoint() {
        let err = S3Store::new(&location("")).unwrap_err();
        assert!(matches!(err, Error::StoreClient { .. }));
    }

    #[test]
    fn test_debug_does_not_leak_credentials() {
        let store = S3Store::new(&location("minio.internal:9000")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("minio.internal"));
        assert!(!debug.contains("AKIATEST"));
    }

    #[tokio::test]
    async fn test_get_object_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vault-plugins/plugin-x-amd64"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plugin binary".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3Store::new(&location(&server.uri())).unwrap();
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("plugin-x-amd64");

        fetch_artifact(&store, "vault-plugins", "plugin-x-amd64", &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"plugin binary");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vault-plugins/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message><Key>missing</Key><BucketName>vault-plugins</BucketName><RequestId>1</RequestId></Error>"#,
                    ),
            )
            .mount(&server)
            .await;

        let store = S3Store::new(&location(&server.uri())).unwrap();
        let err = match store.get_object("vault-plugins", "missing").await {
            Ok(_) => panic!("expected an error for a missing key"),
            Err(e) => e,
        };

        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_access_denied_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vault-plugins/secret-plugin"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessDenied</Code><Message>Access Denied.</Message><RequestId>2</RequestId></Error>"#,
                    ),
            )
            .mount(&server)
            .await;

        let store = S3Store::new(&location(&server.uri())).unwrap();
        let err = match store.get_object("vault-plugins", "secret-plugin").await {
            Ok(_) => panic!("expected an error for a denied request"),
            Err(e) => e,
        };

        match err {
            FetchError::Transport { key, message } => {
                assert_eq!(key, "secret-plugin");
                assert!(message.contains("AccessDenied"), "{message}");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
