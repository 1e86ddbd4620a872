use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::attachment::Attachment;

const KEY_PREFIX: &str = "attachments";

/// Attachment file bytes, kept in one S3 bucket under `attachments/<storage name>`.
#[derive(Clone)]
pub struct AttachmentStorage {
    s3: aws_sdk_s3::Client,
    bucket: String,
}

pub struct StoredFile {
    pub bytes: Bytes,
}

impl AttachmentStorage {
    pub fn new(s3: aws_sdk_s3::Client, bucket: String) -> Self {
        AttachmentStorage { s3, bucket }
    }

    pub fn key(storage_name: &str) -> String {
        format!("{KEY_PREFIX}/{storage_name}")
    }

    pub async fn put(
        &self,
        storage_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), AppError> {
        let key = Self::key(storage_name);
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        info!("Uploaded attachment to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    pub async fn get(&self, storage_name: &str) -> Result<StoredFile, AppError> {
        let output = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(Self::key(storage_name))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 download failed: {e}")))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("S3 body read failed: {e}")))?
            .into_bytes();
        Ok(StoredFile { bytes })
    }

    /// Removes the files of attachments whose rows were deleted in a committed
    /// transaction. Failures are logged and skipped: the rows are already gone.
    pub async fn purge(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            let key = Self::key(&attachment.storage_name);
            match self
                .s3
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(_) => info!(
                    "Purged attachment {} (s3://{}/{})",
                    attachment.id, self.bucket, key
                ),
                Err(e) => warn!("Could not purge s3://{}/{}: {e}", self.bucket, key),
            }
        }
    }
}
