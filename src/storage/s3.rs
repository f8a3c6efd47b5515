//! S3-compatible object client
//!
//! Implements [`ObjectClient`] over the AWS SDK. Built only with the `aws`
//! cargo feature; deployments on other vendors supply their own client.
//!
//! ## Configuration
//!
//! Credentials and endpoint resolution follow the standard AWS credential
//! chain; the bucket and optional region come from the store configuration.
//! A missing object (`NoSuchKey` or a bare HTTP 404 from S3-compatible
//! stores) maps to `None`, which the document layer treats as an empty
//! store.

use crate::errors::{Result, StrongroomError};
use crate::storage::ObjectClient;
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

/// Object client backed by an S3-compatible bucket.
pub struct S3ObjectClient {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectClient")
            .field("bucket", &self.bucket)
            .field("client", &"[S3Client]")
            .finish()
    }
}

impl S3ObjectClient {
    /// Build a client for the given bucket, optionally pinning a region.
    pub async fn new(bucket: impl Into<String>, region: Option<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(StrongroomError::config("object store bucket must not be empty"));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;

        debug!(bucket = %bucket, "S3 object client initialized");
        Ok(Self { client: Client::new(&config), bucket })
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get_object().bucket(&self.bucket).key(key).send().await;

        let output = match response {
            Ok(output) => output,
            Err(SdkError::ServiceError(context))
                if context.err().is_no_such_key() || context.raw().status().as_u16() == 404 =>
            {
                return Ok(None);
            }
            Err(err) => {
                return Err(StrongroomError::store_with_source(
                    format!("Failed to fetch object '{}' from bucket '{}'", key, self.bucket),
                    Box::new(err),
                ));
            }
        };

        let bytes = output.body.collect().await.map_err(|err| {
            StrongroomError::store_with_source(
                format!("Failed to read object '{}' body", key),
                Box::new(err),
            )
        })?;
        Ok(Some(bytes.into_bytes().to_vec()))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                StrongroomError::store_with_source(
                    format!("Failed to write object '{}' to bucket '{}'", key, self.bucket),
                    Box::new(err),
                )
            })?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                StrongroomError::store_with_source(
                    format!("Failed to delete object '{}' from bucket '{}'", key, self.bucket),
                    Box::new(err),
                )
            })?;
        Ok(())
    }
}
