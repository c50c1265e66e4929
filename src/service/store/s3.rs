//! S3 blob backend.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, error::SdkError, primitives::ByteStream};
use tracing::{debug, instrument};

use crate::base::{
    config::Config,
    error::{BotError, BotResult},
};

use super::{BlobClient, GenericBlobStore, Metadata, PutOutcome};

/// Blob backend for a single S3 bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a new S3 backend from configuration.
    ///
    /// Credentials come from the default AWS provider chain.
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.aws_endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared_config = loader.load().await;

        Self {
            client: Client::new(&shared_config),
            bucket: config.img_bucket.clone(),
        }
    }
}

impl BlobClient {
    /// Creates an S3 blob client from configuration.
    pub async fn s3(config: &Config) -> Self {
        Self::new(Arc::new(S3BlobStore::from_config(config).await))
    }
}

/// True when S3 refused a conditional write because the object exists.
fn is_conflict<E>(err: &SdkError<E>) -> bool {
    err.raw_response().is_some_and(|response| matches!(response.status().as_u16(), 409 | 412))
}

#[async_trait]
impl GenericBlobStore for S3BlobStore {
    #[instrument(skip(self, body, metadata), fields(bucket = %self.bucket))]
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str, metadata: &Metadata) -> BotResult<PutOutcome> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata.clone().into_iter().collect()))
            .if_none_match("*")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(err) if is_conflict(&err) => {
                debug!("object already exists");
                Ok(PutOutcome::AlreadyExists)
            }
            Err(err) => Err(BotError::storage(format!("put_object s3://{}/{key}", self.bucket), err)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> BotResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(BotError::storage(format!("head_object s3://{}/{key}", self.bucket), err)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> BotResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix).into_paginator().send();

        while let Some(page) = pages.next().await {
            let response = page.map_err(|err| BotError::storage(format!("list_objects_v2 s3://{}/{prefix}", self.bucket), err))?;

            keys.extend(response.contents().iter().filter_map(|object| object.key()).filter(|key| !key.ends_with('/')).map(str::to_string));
        }

        debug!(count = keys.len(), "listed objects");

        Ok(keys)
    }
}
