//! S3 object store (`aws-sdk-s3`).
//!
//! Small bodies go up in a single `PutObject`. Bodies at or above the
//! multipart threshold are streamed as a multipart upload in `part_size`
//! chunks, so no single request carries the whole object.
//!
//! A multipart upload that fails is aborted before `put` returns. One that is
//! dropped mid-flight (batch cancelled, request deadline hit) spawns the abort
//! on the current runtime instead. Neither path survives a process crash, so
//! buckets should also carry an `AbortIncompleteMultipartUpload` lifecycle
//! rule.

use super::cleanup::CleanupGuard;
use super::{ObjectStore, PutOptions, StoreError, StoredObject, chunks, join_url};
use crate::config::{MIN_PART_SIZE, S3Config};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use bytes::Bytes;
use tracing::{debug, warn};

/// Service error codes that mean "we could not talk to the store as
/// ourselves" rather than "the store refused this object".
const UNAVAILABLE_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
    "TokenRefreshRequired",
    "RequestTimeout",
    "ServiceUnavailable",
    "SlowDown",
    "InternalError",
];

pub struct S3Store {
    client: Client,
    bucket: String,
    base_url: String,
    multipart_threshold: usize,
    part_size: usize,
}

impl S3Store {
    /// Build a client from config. Static credentials win over the default
    /// provider chain when both halves are present.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "ampe-convert-config",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Self::new(Client::from_conf(s3_config), config)
    }

    pub fn new(client: Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            base_url: object_base_url(config),
            multipart_threshold: config.multipart_threshold,
            part_size: config.part_size.max(MIN_PART_SIZE),
        }
    }

    fn acl(options: &PutOptions) -> Option<ObjectCannedAcl> {
        options.public_read.then_some(ObjectCannedAcl::PublicRead)
    }

    async fn put_single(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> Result<u64, StoreError> {
        let len = body.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(options.content_type)
            .content_length(len as i64)
            .set_acl(Self::acl(options))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(len)
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> Result<u64, StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(options.content_type)
            .set_acl(Self::acl(options))
            .send()
            .await
            .map_err(map_sdk_error)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Rejected("multipart upload without an id".into()))?
            .to_string();

        let on_drop = self.abort_on_drop(key, &upload_id);
        let result = self.send_parts(key, &upload_id, &body).await;
        on_drop.disarm();
        if result.is_err() {
            abort_upload(&self.client, &self.bucket, key, &upload_id).await;
        }
        result
    }

    /// Abort `upload_id` in the background if the put future is dropped.
    fn abort_on_drop(&self, key: &str, upload_id: &str) -> CleanupGuard {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let upload_id = upload_id.to_string();
        CleanupGuard::new(move || {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(%key, %upload_id, "multipart upload dropped outside a runtime, not aborted");
                return;
            };
            warn!(%key, %upload_id, "multipart upload dropped mid-flight, aborting");
            runtime.spawn(async move {
                abort_upload(&client, &bucket, &key, &upload_id).await;
            });
        })
    }

    async fn send_parts(&self, key: &str, upload_id: &str, body: &Bytes) -> Result<u64, StoreError> {
        let mut parts = Vec::new();
        let mut sent = 0u64;

        for (index, chunk) in chunks(body, self.part_size).enumerate() {
            let part_number = index as i32 + 1;
            let chunk_len = chunk.len() as u64;
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(chunk_len as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(map_sdk_error)?;
            sent += chunk_len;
            debug!(key, part_number, bytes = chunk_len, "part uploaded");

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(sent)
    }

}

async fn abort_upload(client: &Client, bucket: &str, key: &str, upload_id: &str) {
    match client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        Ok(_) => debug!(key, upload_id, "multipart upload aborted"),
        Err(e) => {
            warn!(key, error = %DisplayErrorContext(&e), "failed to abort multipart upload")
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> Result<StoredObject, StoreError> {
        let sent = if body.len() >= self.multipart_threshold {
            self.put_multipart(key, body, options).await?
        } else {
            self.put_single(key, body, options).await?
        };

        Ok(StoredObject {
            url: join_url(&self.base_url, key),
            bytes_transferred: sent,
        })
    }
}

/// Base URL objects are reachable under.
///
/// Configured `public_base_url` first, then a path-style URL for custom
/// endpoints, then the virtual-hosted AWS URL.
pub fn object_base_url(config: &S3Config) -> String {
    if let Some(url) = &config.public_base_url {
        return url.trim_end_matches('/').to_string();
    }
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    }
}

/// Whether a service error code means the store is unreachable for us.
pub fn is_unavailable_code(code: Option<&str>) -> bool {
    code.is_some_and(|c| UNAVAILABLE_CODES.contains(&c))
}

fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service) => {
            if is_unavailable_code(service.err().code()) {
                StoreError::Unavailable(message)
            } else {
                StoreError::Rejected(message)
            }
        }
        _ => StoreError::Unavailable(message),
    }
}
