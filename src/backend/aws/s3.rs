//! [`AwsS3Store`]: the source-store and target-store contracts over
//! `aws-sdk-s3`. One instance serves both `SourceStore::head` (passing an
//! arbitrary `bucket`) and the full `TargetStore` contract bound to
//! `self.bucket` — mirroring §6's "the mirror writes and deletes into" a
//! single configured target.

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;

use super::with_timeout;
use crate::copy::ENTITY_TOO_LARGE_MARKER;
use crate::error::{MirrorError, Result};
use crate::model::{CompletedPartSpec, ObjectMeta};
use crate::ports::{SourceStore, TargetStore};

pub struct AwsS3Store {
    client: Client,
    bucket: String,
}

impl AwsS3Store {
    /// `bucket` is the target bucket this store writes into; `head` on the
    /// [`SourceStore`] side takes its own bucket per call and ignores it.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn copy_source(bucket: &str, key: &str) -> String {
        format!("{bucket}/{}", urlencoding::encode(key))
    }
}

#[async_trait]
impl SourceStore for AwsS3Store {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        with_timeout(
            async {
                match self.client.head_object().bucket(bucket).key(key).send().await {
                    Ok(resp) => Ok(Some(ObjectMeta {
                        size: resp.content_length().unwrap_or(0).max(0) as u64,
                        etag: resp.e_tag().map(str::to_string),
                    })),
                    Err(err) => {
                        let service_err = err.into_service_error();
                        if service_err.is_not_found() {
                            Ok(None)
                        } else {
                            Err(MirrorError::SourceHeadFailed {
                                key: key.to_string(),
                                reason: service_err.to_string(),
                            })
                        }
                    }
                }
            },
            || MirrorError::SourceHeadFailed {
                key: key.to_string(),
                reason: "head_object timed out".to_string(),
            },
        )
        .await
    }
}

#[async_trait]
impl TargetStore for AwsS3Store {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        SourceStore::head(self, &self.bucket, key).await
    }

    async fn copy_single(&self, src_bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        with_timeout(
            async {
                self.client
                    .copy_object()
                    .bucket(&self.bucket)
                    .key(dst_key)
                    .copy_source(Self::copy_source(src_bucket, src_key))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|err| {
                        let service_err = err.into_service_error();
                        let reason = if service_err.code() == Some(ENTITY_TOO_LARGE_MARKER) {
                            ENTITY_TOO_LARGE_MARKER.to_string()
                        } else {
                            service_err.to_string()
                        };
                        MirrorError::CopyFailed {
                            key: dst_key.to_string(),
                            reason,
                        }
                    })
            },
            || MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: "copy_object timed out".to_string(),
            },
        )
        .await
    }

    async fn initiate_multipart(&self, dst_key: &str) -> Result<String> {
        with_timeout(
            async {
                let resp = self
                    .client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(dst_key)
                    .send()
                    .await
                    .map_err(|err| MirrorError::CopyFailed {
                        key: dst_key.to_string(),
                        reason: err.to_string(),
                    })?;
                resp.upload_id().map(str::to_string).ok_or_else(|| MirrorError::CopyFailed {
                    key: dst_key.to_string(),
                    reason: "create_multipart_upload returned no upload_id".to_string(),
                })
            },
            || MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: "create_multipart_upload timed out".to_string(),
            },
        )
        .await
    }

    async fn copy_part(
        &self,
        dst_key: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        byte_range: (u64, u64),
    ) -> Result<String> {
        with_timeout(
            async {
                let (start, end) = byte_range;
                let resp = self
                    .client
                    .upload_part_copy()
                    .bucket(&self.bucket)
                    .key(dst_key)
                    .upload_id(upload_id)
                    .part_number(part_number as i32)
                    .copy_source(Self::copy_source(src_bucket, src_key))
                    .copy_source_range(format!("bytes={start}-{}", end.saturating_sub(1)))
                    .send()
                    .await
                    .map_err(|err| MirrorError::CopyFailed {
                        key: dst_key.to_string(),
                        reason: err.to_string(),
                    })?;

                resp.copy_part_result()
                    .and_then(|r| r.e_tag())
                    .map(str::to_string)
                    .ok_or_else(|| MirrorError::CopyFailed {
                        key: dst_key.to_string(),
                        reason: format!("part {part_number} response carried no ETag"),
                    })
            },
            || MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: format!("upload_part_copy timed out for part {part_number}"),
            },
        )
        .await
    }

    async fn complete_multipart(&self, dst_key: &str, upload_id: &str, parts: &[CompletedPartSpec]) -> Result<()> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| CompletedPart::builder().part_number(p.number as i32).e_tag(&p.etag).build())
                    .collect(),
            ))
            .build();

        with_timeout(
            async {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(dst_key)
                    .upload_id(upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|err| MirrorError::CopyFailed {
                        key: dst_key.to_string(),
                        reason: err.to_string(),
                    })
            },
            || MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: "complete_multipart_upload timed out".to_string(),
            },
        )
        .await
    }

    async fn abort_multipart(&self, dst_key: &str, upload_id: &str) -> Result<()> {
        with_timeout(
            async {
                self.client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(dst_key)
                    .upload_id(upload_id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|err| MirrorError::CopyFailed {
                        key: dst_key.to_string(),
                        reason: err.to_string(),
                    })
            },
            || MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: "abort_multipart_upload timed out".to_string(),
            },
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        with_timeout(
            async {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|err| MirrorError::DeleteFailed {
                        key: key.to_string(),
                        reason: err.to_string(),
                    })
            },
            || MirrorError::DeleteFailed {
                key: key.to_string(),
                reason: "delete_object timed out".to_string(),
            },
        )
        .await
    }
}
