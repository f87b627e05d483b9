//! S3-compatible object storage backend.
//!
//! Works against AWS S3 and S3-compatible stores (MinIO, Ceph RGW) via a
//! configurable endpoint. The dataset root maps to a bucket; object keys map
//! to S3 keys unchanged. Conditional writes use the `If-Match` /
//! `If-None-Match` preconditions, which S3 answers with HTTP 412 when the
//! stored generation differs.

use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::traits::{Backend, ObjectBody, ObjectStat, RemoveFailure, WriteCondition};

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Endpoint URL for non-AWS stores (e.g. `http://localhost:9000`).
    /// When `None`, the AWS endpoint for the region is used.
    pub endpoint: Option<String>,
    /// Static access key.
    pub access_key: String,
    /// Static secret key.
    pub secret_key: String,
    /// Bucket region. Optional for stores like MinIO.
    pub region: Option<String>,
    /// Use path-style addressing (`host/bucket/key`), required by MinIO.
    pub force_path_style: bool,
}

/// Backend over an S3-compatible object store.
#[derive(Debug)]
pub struct S3Backend {
    client: Client,
    region: Option<String>,
}

impl S3Backend {
    /// Build a backend from static connection settings.
    pub fn new(settings: S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key,
            settings.secret_key,
            None,
            None,
            "strata-config",
        );
        let region = settings
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .force_path_style(settings.force_path_style);
        if let Some(endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region: settings.region,
        }
    }
}

fn remote<E>(op: &'static str, err: SdkError<E>) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BackendError::Remote {
        op,
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[async_trait::async_trait]
impl Backend for S3Backend {
    async fn ensure_root(&self, root: &str) -> Result<(), BackendError> {
        let mut request = self.client.create_bucket().bucket(root);
        if let Some(region) = self.region.as_deref() {
            if region != "us-east-1" {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }
        }

        match request.send().await {
            Ok(_) => {
                debug!(bucket = root, "created bucket");
                Ok(())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_bucket_already_owned_by_you()
                    || service_err.is_bucket_already_exists()
                {
                    debug!(bucket = root, "bucket already exists");
                    Ok(())
                } else {
                    Err(BackendError::Remote {
                        op: "create_bucket",
                        message: service_err.to_string(),
                    })
                }
            }
        }
    }

    async fn stat_object(&self, root: &str, key: &str) -> Result<Option<ObjectStat>, BackendError> {
        match self.client.head_object().bucket(root).key(key).send().await {
            Ok(output) => Ok(Some(ObjectStat {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0) as u64,
                etag: output.e_tag().map(str::to_string),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(BackendError::Remote {
                        op: "head_object",
                        message: service_err.to_string(),
                    })
                }
            }
        }
    }

    async fn get_object(&self, root: &str, key: &str) -> Result<ObjectBody, BackendError> {
        let output = match self.client.get_object().bucket(root).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                return Err(if service_err.is_no_such_key() {
                    BackendError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    BackendError::Remote {
                        op: "get_object",
                        message: service_err.to_string(),
                    }
                });
            }
        };

        let etag = output.e_tag().map(str::to_string);
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Remote {
                op: "get_object",
                message: e.to_string(),
            })?
            .into_bytes();
        Ok(ObjectBody { data, etag })
    }

    async fn put_object(
        &self,
        root: &str,
        key: &str,
        data: Bytes,
        condition: WriteCondition,
    ) -> Result<(), BackendError> {
        let mut request = self
            .client
            .put_object()
            .bucket(root)
            .key(key)
            .body(ByteStream::from(data));
        request = match condition {
            WriteCondition::Any => request,
            WriteCondition::IfAbsent => request.if_none_match("*"),
            WriteCondition::IfMatch(etag) => request.if_match(etag),
        };

        match request.send().await {
            Ok(_) => {
                debug!(bucket = root, key, "stored object");
                Ok(())
            }
            Err(err) => {
                // S3 answers a failed If-Match with 412, and If-Match against
                // a missing key with 404. Both mean the precondition did not
                // hold.
                if let SdkError::ServiceError(ref ctx) = err {
                    let status = ctx.raw().status().as_u16();
                    if status == 412 || status == 404 {
                        return Err(BackendError::PreconditionFailed {
                            key: key.to_string(),
                        });
                    }
                }
                Err(remote("put_object", err))
            }
        }
    }

    async fn list_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectStat>, BackendError> {
        let mut stats = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(root).prefix(prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| remote("list_objects", e))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                stats.push(ObjectStat {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0) as u64,
                    etag: object.e_tag().map(str::to_string),
                });
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(stats)
    }

    async fn remove_prefix(
        &self,
        root: &str,
        prefix: &str,
    ) -> Result<Vec<RemoveFailure>, BackendError> {
        let mut failures = Vec::new();
        for stat in self.list_prefix(root, prefix).await? {
            if let Err(err) = self
                .client
                .delete_object()
                .bucket(root)
                .key(&stat.key)
                .send()
                .await
            {
                warn!(bucket = root, key = %stat.key, "failed to remove object");
                failures.push(RemoveFailure {
                    key: stat.key,
                    message: DisplayErrorContext(&err).to_string(),
                });
            }
        }
        Ok(failures)
    }
}
