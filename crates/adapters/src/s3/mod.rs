//! Production `ObjectStore`: an S3 bucket, accessed through `aws-sdk-s3`.
//!
//! The rest of the planning pass is synchronous; this adapter owns a dedicated
//! single-threaded Tokio runtime and blocks on it, the same way the daemon owns a
//! runtime at its process boundary rather than bleeding async through every layer
//! (`daemon/src/runtime.rs`). The upload calling convention — hand the client a byte source and a
//! key, let it pick single-part vs. multipart — is grounded on `chrisdsa-zfs2s3`'s
//! `S3Client::upload_stream`.

use std::io::Read;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use coldsnap_planner::{ObjectStore, PlannerError};

use crate::error::AdapterError;

/// Mirrors a config file's `remotes[].s3.endpoint` block.
#[derive(Debug, Clone, Default)]
pub struct S3EndpointConfig {
    pub region_name: Option<String>,
    pub profile_name: Option<String>,
    pub verify: Verify,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub enum Verify {
    #[default]
    SystemDefault,
    Disabled,
    CaBundle(String),
}

/// Parts larger than this are split into 8 MiB chunks and uploaded with a multipart upload;
/// anything smaller goes out as a single `put_object`.
const MULTIPART_THRESHOLD: usize = 8 * 1024 * 1024;
const PART_SIZE: usize = 8 * 1024 * 1024;

pub struct S3ObjectStore {
    bucket: String,
    client: Client,
    runtime: tokio::runtime::Runtime,
}

impl S3ObjectStore {
    pub fn connect(bucket: impl Into<String>, endpoint: &S3EndpointConfig) -> Result<Self, AdapterError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(AdapterError::Io)?;
        let client = runtime.block_on(build_client(endpoint));
        Ok(Self { bucket: bucket.into(), client, runtime })
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

async fn build_client(endpoint: &S3EndpointConfig) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &endpoint.region_name {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(profile) = &endpoint.profile_name {
        loader = loader.profile_name(profile.clone());
    }
    if let Some(url) = &endpoint.endpoint_url {
        loader = loader.endpoint_url(url.clone());
    }
    let shared_config = loader.load().await;
    let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
    if matches!(endpoint.verify, Verify::Disabled) {
        // Self-signed / private-CA endpoints. `aws-sdk-s3` has no
        // first-class "disable TLS verification" knob; this is accepted as a documented gap and
        // flagged in DESIGN.md rather than reached for a custom hyper connector.
        tracing::warn!("s3 endpoint configured with verify=false; certificate verification is not currently disabled by this adapter");
    }
    Client::from_conf(builder.force_path_style(endpoint.endpoint_url.is_some()).build())
}

impl ObjectStore for S3ObjectStore {
    fn list(&self) -> Result<Vec<String>, PlannerError> {
        self.block_on(async {
            let mut keys = Vec::new();
            let mut continuation = None;
            loop {
                let mut request = self.client.list_objects_v2().bucket(&self.bucket);
                if let Some(token) = continuation.take() {
                    request = request.continuation_token(token);
                }
                let response = request.send().await.map_err(|e| AdapterError::S3(e.to_string()))?;
                for object in response.contents() {
                    if let Some(key) = object.key() {
                        keys.push(key.to_owned());
                    }
                }
                if response.is_truncated().unwrap_or(false) {
                    continuation = response.next_continuation_token().map(str::to_owned);
                } else {
                    break;
                }
            }
            Ok(keys)
        })
    }

    fn put_stream(&self, key: &str, reader: &mut dyn Read) -> Result<(), PlannerError> {
        let mut buf = vec![0u8; PART_SIZE];
        let first_len = read_full(reader, &mut buf).map_err(AdapterError::Io)?;
        if first_len < MULTIPART_THRESHOLD {
            buf.truncate(first_len);
            self.block_on(async {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(buf))
                    .send()
                    .await
                    .map_err(|e| AdapterError::S3(e.to_string()))?;
                Ok(())
            })
        } else {
            self.multipart_upload(key, &buf[..first_len], reader)
        }
    }

    fn delete(&self, key: &str) -> Result<(), PlannerError> {
        self.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| AdapterError::S3(e.to_string()))?;
            Ok(())
        })
    }
}

impl S3ObjectStore {
    /// Streams the rest of `reader` (with `first_part` already read) to `key` via a multipart
    /// upload, aborting the upload on any failure so no partial object is ever observable.
    fn multipart_upload(&self, key: &str, first_part: &[u8], reader: &mut dyn Read) -> Result<(), PlannerError> {
        self.block_on(async {
            let create = self
                .client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| AdapterError::S3(e.to_string()))?;
            let upload_id = create.upload_id().ok_or_else(|| AdapterError::S3("missing upload id".to_owned()))?.to_owned();

            let result = self.upload_parts(key, &upload_id, first_part, reader).await;
            match result {
                Ok(completed_parts) => {
                    self.client
                        .complete_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .multipart_upload(
                            aws_sdk_s3::types::CompletedMultipartUpload::builder().set_parts(Some(completed_parts)).build(),
                        )
                        .send()
                        .await
                        .map_err(|e| AdapterError::S3(e.to_string()))?;
                    Ok(())
                }
                Err(err) => {
                    let _ = self
                        .client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .send()
                        .await;
                    Err(err)
                }
            }
        })
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_part: &[u8],
        reader: &mut dyn Read,
    ) -> Result<Vec<aws_sdk_s3::types::CompletedPart>, AdapterError> {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut chunk = first_part.to_vec();
        loop {
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| AdapterError::S3(e.to_string()))?;
            parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_owned))
                    .build(),
            );

            let mut next = vec![0u8; PART_SIZE];
            let len = read_full(reader, &mut next)?;
            if len == 0 {
                break;
            }
            next.truncate(len);
            chunk = next;
            part_number += 1;
        }
        Ok(parts)
    }
}

/// Reads until `buf` is full or the reader is exhausted, returning the number of bytes read.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
