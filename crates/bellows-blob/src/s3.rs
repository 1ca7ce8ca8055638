//! S3-compatible blob backend.
//!
//! Speaks plain HTTPS against AWS S3 or any S3-compatible endpoint
//! (MinIO, Backblaze, Tigris), authenticated with manually computed
//! Signature Version 4 headers, with no SDK dependency. Objects are addressed
//! path-style as `/<bucket>/<owner>/<repo>/<oid>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;

use crate::sigv4::{payload_hash, sign_request, SigningKey, EMPTY_PAYLOAD_SHA256};
use crate::{collect, BlobError, BlobKey, BlobStore, ByteStream, Result};

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Region used in the credential scope.
    pub region: String,
    /// Custom endpoint for S3-compatible services; AWS when unset.
    pub endpoint: Option<String>,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Optional STS session token.
    pub session_token: Option<String>,
}

impl S3Config {
    fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }

    fn host(&self) -> String {
        let base = self.base_url();
        let without_scheme = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .unwrap_or(&base);
        without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_string()
    }
}

/// Blob store over one S3 bucket.
pub struct S3BlobStore {
    config: S3Config,
    client: reqwest::Client,
}

impl S3BlobStore {
    /// Create a store for the configured bucket.
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn object_uri(&self, key: &BlobKey) -> String {
        format!("/{}/{}", self.config.bucket, key.relative())
    }

    fn object_url(&self, key: &BlobKey) -> String {
        format!("{}{}", self.config.base_url(), self.object_uri(key))
    }

    /// Issue one signed request with the given body.
    async fn send(
        &self,
        method: reqwest::Method,
        key: &BlobKey,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let timestamp = Utc::now();
        let date_time = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let body_hash = match &body {
            Some(bytes) => payload_hash(bytes),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };

        let mut headers = BTreeMap::from([
            ("host".to_string(), self.config.host()),
            ("x-amz-content-sha256".to_string(), body_hash.clone()),
            ("x-amz-date".to_string(), date_time.clone()),
        ]);
        if let Some(token) = &self.config.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let signing_key = SigningKey {
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
            region: &self.config.region,
        };
        let authorization = sign_request(
            &signing_key,
            method.as_str(),
            &self.object_uri(key),
            "",
            &headers,
            &body_hash,
            timestamp,
        );

        let mut request = self
            .client
            .request(method, self.object_url(key))
            .header("Authorization", authorization)
            .header("x-amz-date", date_time)
            .header("x-amz-content-sha256", body_hash);
        if let Some(token) = &self.config.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        request
            .send()
            .await
            .map_err(|e| BlobError::Network(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &BlobKey, stream: ByteStream) -> Result<()> {
        // The payload hash covers the whole body, so the upload is buffered
        // before signing.
        let body = collect(stream).await?;
        let response = self
            .send(reqwest::Method::PUT, key, Some(body.to_vec()))
            .await?;
        if !response.status().is_success() {
            return Err(BlobError::Backend(format!(
                "PUT {key}: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<ByteStream> {
        let response = self.send(reqwest::Method::GET, key, None).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(key.relative()));
        }
        if !response.status().is_success() {
            return Err(BlobError::Backend(format!(
                "GET {key}: {}",
                response.status()
            )));
        }
        Ok(Box::pin(
            response.bytes_stream().map_err(std::io::Error::other),
        ))
    }

    async fn delete(&self, key: &BlobKey) -> Result<()> {
        let response = self.send(reqwest::Method::DELETE, key, None).await?;
        // S3 reports deleting a missing object as success; compatible
        // services sometimes answer 404 instead.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::Backend(format!(
                "DELETE {key}: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool> {
        let response = self.send(reqwest::Method::HEAD, key, None).await?;
        if response.status().is_success() {
            return Ok(true);
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Err(BlobError::Backend(format!(
            "HEAD {key}: {}",
            response.status()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            bucket: "forge-lfs".to_string(),
            region: "eu-central-1".to_string(),
            endpoint: None,
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn aws_url_is_path_style() {
        let store = S3BlobStore::new(config());
        let key = BlobKey::new("alice", "widget", "ff");
        assert_eq!(
            store.object_url(&key),
            "https://s3.eu-central-1.amazonaws.com/forge-lfs/alice/widget/ff"
        );
        assert_eq!(store.object_uri(&key), "/forge-lfs/alice/widget/ff");
    }

    #[test]
    fn custom_endpoint_overrides_host() {
        let mut cfg = config();
        cfg.endpoint = Some("http://minio.internal:9000/".to_string());
        let store = S3BlobStore::new(cfg);
        let key = BlobKey::new("alice", "widget", "ff");
        assert_eq!(
            store.object_url(&key),
            "http://minio.internal:9000/forge-lfs/alice/widget/ff"
        );
        assert_eq!(store.config.host(), "minio.internal:9000");
    }

    #[test]
    fn aws_host_derives_from_region() {
        let store = S3BlobStore::new(config());
        assert_eq!(store.config.host(), "s3.eu-central-1.amazonaws.com");
    }
}
