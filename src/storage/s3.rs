//! S3-compatible backend
//!
//! Snapshots live under `<key_prefix>/raft_snapshots/`. Objects below the multipart
//! threshold go up in a single `PutObject`; larger ones use a multipart upload whose
//! parts are zero-copy slices of the captured buffer.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ServerSideEncryption};
use aws_sdk_s3::Client;
use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use tracing::{debug, warn};

use super::naming::snapshot_timestamp;
use super::{
    prune_snapshots, tls, BackendInitError, BackendKind, CapturedSnapshot, PersistError, PruneError,
    PruneReport, RetentionPolicy, SnapshotBackend, SnapshotObject, SNAPSHOT_SUFFIX,
};
use crate::config::S3Config;

/// Size of each multipart upload part
pub const PART_SIZE: usize = 5 * 1024 * 1024;

const SNAPSHOT_DIR: &str = "raft_snapshots";
const CREDENTIALS_PROVIDER: &str = "raft-snapshot-agent";

/// Key prefix under which snapshots are stored for a configured prefix.
pub fn snapshot_key_prefix(configured: &str) -> String {
    let configured = configured.trim_matches('/');
    if configured.is_empty() {
        SNAPSHOT_DIR.to_string()
    } else {
        format!("{}/{}", configured, SNAPSHOT_DIR)
    }
}

/// S3 snapshot backend
pub struct S3Backend {
    client: Client,
    bucket: String,
    key_prefix: String,
    server_side_encryption: bool,
    static_snapshot_name: Option<String>,
}

impl S3Backend {
    /// Build the client with the agent's TLS policy, optional static credentials,
    /// endpoint override and path-style addressing.
    pub async fn new(config: &S3Config) -> Result<Self, BackendInitError> {
        let ca_cert = (!config.ca_cert.is_empty()).then(|| Path::new(&config.ca_cert));
        let tls_config = tls::client_config(ca_cert)?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let http_client = HyperClientBuilder::new().build(connector);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region().to_string()))
            .http_client(http_client);

        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        // Support for MinIO and other S3-compatible stores
        if !config.endpoint.is_empty() {
            loader = loader.endpoint_url(&config.endpoint);
        }

        let shared_config = loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self::from_client(Client::from_conf(s3_config_builder.build()), config))
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client, config: &S3Config) -> Self {
        let static_snapshot_name = Some(config.static_snapshot_name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Self {
            client,
            bucket: config.bucket.clone(),
            key_prefix: snapshot_key_prefix(&config.key_prefix),
            server_side_encryption: config.server_side_encryption,
            static_snapshot_name,
        }
    }

    /// Object key the snapshot is written to
    pub fn object_key(&self, snapshot: &CapturedSnapshot) -> String {
        match &self.static_snapshot_name {
            Some(name) => format!("{}/{}{}", self.key_prefix, name, SNAPSHOT_SUFFIX),
            None => format!("{}/{}", self.key_prefix, snapshot.object_name()),
        }
    }

    async fn put_single(&self, key: &str, snapshot: &CapturedSnapshot) -> Result<(), PersistError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(snapshot.len() as i64)
            .body(ByteStream::from(snapshot.data().clone()));

        if self.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request
            .send()
            .await
            .map_err(|e| PersistError::Upload(format!("PutObject {}: {}", key, DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, snapshot: &CapturedSnapshot) -> Result<(), PersistError> {
        let mut create = self.client.create_multipart_upload().bucket(&self.bucket).key(key);
        if self.server_side_encryption {
            create = create.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let upload = create.send().await.map_err(|e| {
            PersistError::Upload(format!("CreateMultipartUpload {}: {}", key, DisplayErrorContext(&e)))
        })?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| PersistError::Upload("No upload ID returned".to_string()))?
            .to_string();

        let parts = match self.upload_parts(key, &upload_id, snapshot).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
        let result = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await;

        if let Err(e) = result {
            self.abort_multipart(key, &upload_id).await;
            return Err(PersistError::Upload(format!(
                "CompleteMultipartUpload {}: {}",
                key,
                DisplayErrorContext(&e)
            )));
        }
        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        snapshot: &CapturedSnapshot,
    ) -> Result<Vec<CompletedPart>, PersistError> {
        let data = snapshot.data();
        let mut parts = Vec::with_capacity(data.len().div_ceil(PART_SIZE));

        for (index, start) in (0..data.len()).step_by(PART_SIZE).enumerate() {
            let end = (start + PART_SIZE).min(data.len());
            let part_number = (index + 1) as i32;

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.slice(start..end)))
                .send()
                .await
                .map_err(|e| {
                    PersistError::Upload(format!("UploadPart {} of {}: {}", part_number, key, DisplayErrorContext(&e)))
                })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(parts)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = result {
            warn!(key = %key, error = %DisplayErrorContext(&e), "Failed to abort multipart upload");
        }
    }
}

fn to_chrono(timestamp: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(timestamp.secs(), timestamp.subsec_nanos()).unwrap_or_default()
}

/// Modification time of a listed object. Entries without `LastModified` fall back to
/// the capture time embedded in a canonical name.
fn object_time(last_modified: Option<&aws_sdk_s3::primitives::DateTime>, name: &str) -> DateTime<Utc> {
    last_modified
        .map(to_chrono)
        .or_else(|| snapshot_timestamp(name).map(|nanos| Utc.timestamp_nanos(nanos)))
        .unwrap_or_default()
}

#[async_trait]
impl SnapshotBackend for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Aws
    }

    fn destination(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key_prefix)
    }

    async fn persist(&self, snapshot: &CapturedSnapshot) -> Result<String, PersistError> {
        let key = self.object_key(snapshot);

        if snapshot.len() < PART_SIZE {
            self.put_single(&key, snapshot).await?;
        } else {
            debug!(key = %key, bytes = snapshot.len(), "Using multipart upload");
            self.put_multipart(&key, snapshot).await?;
        }

        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn list_objects(&self) -> Result<Vec<SnapshotObject>, PruneError> {
        let prefix = format!("{}/", self.key_prefix);
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| PruneError::List(format!("{}", DisplayErrorContext(&e))))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                // Only direct children of the snapshot prefix
                let Some(name) = key.strip_prefix(&prefix).filter(|name| !name.contains('/')) else {
                    continue;
                };

                objects.push(SnapshotObject {
                    name: name.to_string(),
                    last_modified: object_time(object.last_modified(), name),
                    locator: key.to_string(),
                });
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, object: &SnapshotObject) -> Result<(), PruneError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object.locator)
            .send()
            .await
            .map_err(|e| PruneError::Delete {
                name: object.name.clone(),
                reason: format!("{}", DisplayErrorContext(&e)),
            })?;
        Ok(())
    }

    async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport, PruneError> {
        if self.static_snapshot_name.is_some() {
            debug!("Static snapshot name configured, skipping S3 retention");
            return Ok(PruneReport::default());
        }
        prune_snapshots(self, policy).await
    }
}
