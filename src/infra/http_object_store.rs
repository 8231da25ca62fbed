use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::ObjectStorePort;
use crate::config::Credentials;
use crate::error::PublishError;

/// PUTs objects to `{endpoint}/{bucket}/{prefix}/{key}`.
///
/// The access key travels in `x-access-key` and the secret as a bearer token.
/// Neither is ever logged.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    credentials: Credentials,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str, prefix: &str, credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            credentials,
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}/{}", self.endpoint, self.bucket, key)
        } else {
            format!("{}/{}/{}/{}", self.endpoint, self.bucket, self.prefix, key)
        }
    }
}

fn content_type(key: &str) -> &'static str {
    if key.ends_with(".gz") {
        "application/gzip"
    } else if key.ends_with(".csv") {
        "text/csv"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ObjectStorePort for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        let url = self.object_url(key);
        let resp = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.credentials.secret_key))
            .header("x-access-key", self.credentials.access_key.as_str())
            .header(reqwest::header::CONTENT_TYPE, content_type(key))
            .body(bytes)
            .send()
            .await
            .map_err(|error| PublishError::Http {
                name: key.to_string(),
                error,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                name: key.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, status = status.as_u16(), "object stored");
        Ok(())
    }
}
