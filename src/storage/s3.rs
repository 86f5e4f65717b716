use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::{
    types::{CompletedMultipartUpload, CompletedPart, ServerSideEncryption},
    Client,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use log::{debug, trace, warn};
use tokio::{
    fs::{self, File},
    io::AsyncReadExt,
    task::spawn_blocking,
};

use crate::{
    error::{Error, Result},
    format::{format_key, format_size},
    manifest::StorageClass,
};

use super::Storage;

/// Files larger than this are sent as a multipart upload.
pub const DEFAULT_PART_SIZE: u64 = 64 * 1024 * 1024;

const MAX_PARTS: u64 = 10_000;

#[derive(Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    part_size: u64,
}

impl S3Storage {
    pub async fn new(bucket: String) -> Self {
        let s3_config = aws_config::load_from_env().await;
        let client = Client::new(&s3_config);

        S3Storage {
            client,
            bucket,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, storage_class: StorageClass) -> Result<()> {
        let (bytes, encoded_digest) = spawn_blocking(move || {
            let encoded_digest = md5_base64(&bytes);
            (bytes, encoded_digest)
        })
        .await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into())
            .content_md5(encoded_digest)
            .storage_class(storage_class.into())
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        file: &mut File,
        size: u64,
        storage_class: StorageClass,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .storage_class(storage_class.into())
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::Transfer {
                key: key.to_owned(),
                reason: "no upload ID in response".to_owned(),
            })?
            .to_owned();

        let parts = match self.upload_parts(key, &upload_id, file, size).await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(err);
            }
        };

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .multipart_upload(completed_multipart_upload)
            .upload_id(&upload_id)
            .send()
            .await;

        if let Err(err) = completed {
            self.abort_multipart(key, &upload_id).await;
            return Err(err.into());
        }

        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        file: &mut File,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let part_size = part_size_for(self.part_size, size);
        let mut parts = vec![];
        let mut offset = 0;
        let mut part_number: i32 = 1;

        while offset < size {
            let length = part_size.min(size - offset);
            let mut chunk = vec![0; usize::try_from(length)?];
            file.read_exact(&mut chunk).await?;

            let (chunk, encoded_digest) = spawn_blocking(move || {
                let encoded_digest = md5_base64(&chunk);
                (chunk, encoded_digest)
            })
            .await?;

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(chunk.into())
                .content_md5(encoded_digest)
                .send()
                .await?;

            let part = CompletedPart::builder()
                .e_tag(response.e_tag().unwrap_or_default())
                .part_number(part_number)
                .build();
            parts.push(part);

            trace!(
                "uploaded part {part_number} of {} ({})",
                format_key(key),
                format_size(length)
            );

            offset += length;
            part_number += 1;
        }

        Ok(parts)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(err) = aborted {
            warn!(
                "failed to abort multipart upload of {}: {err}",
                format_key(key)
            );
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        storage_class: StorageClass,
    ) -> Result<u64> {
        let mut file = File::open(local_path).await?;
        let size = file.metadata().await?.len();

        if size <= self.part_size {
            let bytes = fs::read(local_path).await?;
            self.put(key, bytes, storage_class).await?;
        } else {
            debug!(
                "using multipart upload for {} ({})",
                format_key(key),
                format_size(size)
            );
            self.put_multipart(key, &mut file, size, storage_class)
                .await?;
        }

        Ok(size)
    }
}

/// Grows the part size when `size` would otherwise need more than the
/// 10 000 parts S3 allows.
fn part_size_for(part_size: u64, size: u64) -> u64 {
    part_size.max(size.div_ceil(MAX_PARTS))
}

fn md5_base64(bytes: &[u8]) -> String {
    let digest = md5::compute(bytes);
    BASE64_STANDARD.encode(digest.0)
}

#[cfg(test)]
mod tests {
    use super::{md5_base64, part_size_for, DEFAULT_PART_SIZE};

    #[test]
    fn part_size_for_small_files() {
        assert_eq!(part_size_for(DEFAULT_PART_SIZE, 1), DEFAULT_PART_SIZE);
        assert_eq!(
            part_size_for(DEFAULT_PART_SIZE, DEFAULT_PART_SIZE * 10_000),
            DEFAULT_PART_SIZE
        );
    }

    #[test]
    fn part_size_for_huge_files() {
        let size = DEFAULT_PART_SIZE * 10_000 + 1;
        let part_size = part_size_for(DEFAULT_PART_SIZE, size);
        assert!(part_size > DEFAULT_PART_SIZE);
        assert!(size.div_ceil(part_size) <= 10_000);
    }

    #[test]
    fn md5_is_base64_encoded() {
        assert_eq!(md5_base64(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }
}
