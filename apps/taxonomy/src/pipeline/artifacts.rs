//! Uploads the hand-off artifacts of a run (mentions, canonical skills,
//! hierarchy, summary) to S3 under `taxonomy-runs/<run_id>/`.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

const RUN_PREFIX: &str = "taxonomy-runs";

#[derive(Clone)]
pub struct ArtifactExporter {
    s3: S3Client,
    bucket: String,
}

impl ArtifactExporter {
    pub fn new(s3: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            s3,
            bucket: bucket.into(),
        }
    }

    pub fn run_prefix(run_id: Uuid) -> String {
        format!("{RUN_PREFIX}/{run_id}")
    }

    /// Serializes `value` as pretty JSON to `<run prefix>/<name>`.
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        run_id: Uuid,
        name: &str,
        value: &T,
    ) -> Result<String, AppError> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| AppError::S3(format!("cannot encode {name}: {e}")))?;
        let key = format!("{}/{name}", Self::run_prefix(run_id));
        let size = body.len();

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::S3(format!("S3 upload failed: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}
