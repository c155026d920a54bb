//! S3-compatible remote cache.
//!
//! Configured from a single URL carrying the endpoint and credentials:
//! `https://s3.example.com/?keyId=...&secretAccessKey=...&bucketName=...`

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, error, info};
use url::Url;

use super::{CacheError, CacheMeta, OptimizationCache};

const META_IDENT: &str = "ident";
const META_ENCODER_VERSION: &str = "encoder_version";
const DEFAULT_REGION: &str = "us-east-1";
const CHECK_KEY: &str = "_wikihow_offline_credentials_check";

/// Connection parameters parsed from the cache URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Params {
    pub endpoint: String,
    pub key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
}

impl S3Params {
    pub fn parse(url_with_credentials: &str) -> Result<Self, CacheError> {
        let url = Url::parse(url_with_credentials)
            .map_err(|e| CacheError::InvalidUrl(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| CacheError::InvalidUrl("missing host".to_string()))?;

        let query: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
            .collect();
        let param = |name: &str| {
            query
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| CacheError::InvalidUrl(format!("missing `{}` parameter", name)))
        };

        let endpoint = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self {
            endpoint,
            key_id: param("keyid")?,
            secret_access_key: param("secretaccesskey")?,
            bucket: param("bucketname")?,
            region: query
                .get("region")
                .cloned()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        })
    }
}

pub struct S3Cache {
    client: Client,
    params: S3Params,
}

impl S3Cache {
    pub fn new(params: S3Params) -> Self {
        let credentials = Credentials::new(
            &params.key_id,
            &params.secret_access_key,
            None,
            None,
            "optimization-cache",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(params.region.clone()))
            .endpoint_url(&params.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
            params,
        }
    }

    pub fn from_url(url_with_credentials: &str) -> Result<Self, CacheError> {
        Ok(Self::new(S3Params::parse(url_with_credentials)?))
    }

    pub fn params(&self) -> &S3Params {
        &self.params
    }

    /// Verify the bucket is reachable and that we can write, read and delete.
    pub async fn check_credentials(&self) -> Result<(), CacheError> {
        info!("Testing optimization cache credentials");
        let bucket = &self.params.bucket;
        let fail = |step: &str, e: String| {
            error!("Optimization cache connection error testing permissions.");
            error!("  Server: {}", self.params.endpoint);
            error!("  Bucket: {}", bucket);
            error!("  Key ID: {}", self.params.key_id);
            CacheError::Credentials(format!("{}: {}", step, e))
        };

        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| fail("bucket", DisplayErrorContext(&e).to_string()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(CHECK_KEY)
            .body(ByteStream::from_static(b"check"))
            .send()
            .await
            .map_err(|e| fail("write", DisplayErrorContext(&e).to_string()))?;
        self.client
            .get_object()
            .bucket(bucket)
            .key(CHECK_KEY)
            .send()
            .await
            .map_err(|e| fail("read", DisplayErrorContext(&e).to_string()))?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(CHECK_KEY)
            .send()
            .await
            .map_err(|e| fail("delete", DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl OptimizationCache for S3Cache {
    async fn fetch(&self, key: &str, meta: &CacheMeta) -> Result<Option<Vec<u8>>, CacheError> {
        let head = match self
            .client
            .head_object()
            .bucket(&self.params.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => head,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Ok(None);
                }
                return Err(CacheError::Backend(DisplayErrorContext(&e).to_string()));
            }
        };

        let stored = head.metadata();
        let stored_ident = stored.and_then(|m| m.get(META_IDENT));
        let stored_version = stored.and_then(|m| m.get(META_ENCODER_VERSION));
        if stored_ident.map(String::as_str) != Some(meta.ident.as_str())
            || stored_version.map(String::as_str) != Some(meta.encoder_version.to_string().as_str())
        {
            debug!("S3::{} metadata mismatch ({:?})", key, stored);
            return Ok(None);
        }

        let object = self
            .client
            .get_object()
            .bucket(&self.params.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CacheError::Backend(DisplayErrorContext(&e).to_string()))?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?
            .into_bytes();
        Ok(Some(bytes.to_vec()))
    }

    async fn store(&self, key: &str, data: &[u8], meta: &CacheMeta) -> Result<(), CacheError> {
        self.client
            .put_object()
            .bucket(&self.params.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .metadata(META_IDENT, &meta.ident)
            .metadata(META_ENCODER_VERSION, meta.encoder_version.to_string())
            .send()
            .await
            .map_err(|e| CacheError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_url() {
        let params = S3Params::parse(
            "https://s3.us-west-1.wasabisys.com/?keyId=AKID&secretAccessKey=s3cr3t&bucketName=org-kiwix-wikihow",
        )
        .unwrap();
        assert_eq!(params.endpoint, "https://s3.us-west-1.wasabisys.com");
        assert_eq!(params.key_id, "AKID");
        assert_eq!(params.secret_access_key, "s3cr3t");
        assert_eq!(params.bucket, "org-kiwix-wikihow");
        assert_eq!(params.region, DEFAULT_REGION);
    }

    #[test]
    fn test_parse_cache_url_with_port() {
        let params = S3Params::parse(
            "http://localhost:9000/?keyId=a&secretAccessKey=b&bucketName=c&region=eu-west-3",
        )
        .unwrap();
        assert_eq!(params.endpoint, "http://localhost:9000");
        assert_eq!(params.region, "eu-west-3");
    }

    #[test]
    fn test_parse_cache_url_missing_bucket() {
        let err = S3Params::parse("https://s3.example.com/?keyId=a&secretAccessKey=b").unwrap_err();
        assert!(matches!(err, CacheError::InvalidUrl(msg) if msg.contains("bucketname")));
    }
}
