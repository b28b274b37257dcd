use anyhow::anyhow;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::infra::storage::ObjectStorage;

const TARGET_WIDTH: u32 = 500;
const JPEG_QUALITY: u8 = 50;

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredImage {
    pub key: String,
    pub location: String,
}

/// Recompresses uploaded pictures and stores them under the uploader's prefix.
#[derive(Clone)]
pub struct UploadService {
    storage: ObjectStorage,
}

impl UploadService {
    pub fn new(storage: ObjectStorage) -> Self {
        Self { storage }
    }

    pub async fn store_image(
        &self,
        owner_id: Uuid,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> ServiceResult<StoredImage> {
        if !content_type.is_some_and(is_image_content_type) {
            return Err(ServiceError::validation("only image uploads are allowed"));
        }
        if data.is_empty() {
            return Err(ServiceError::validation("uploaded file is empty"));
        }

        let original_bytes = data.len();
        let jpeg = tokio::task::spawn_blocking(move || recompress(&data))
            .await
            .map_err(|err| anyhow!("image task failed: {}", err))?
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected undecodable upload");
                ServiceError::validation("file is not a valid image")
            })?;

        let key = format!("{}/{}.jpg", owner_id, Uuid::new_v4());
        let stored_bytes = jpeg.len();
        self.storage.put_object(&key, "image/jpeg", jpeg).await?;
        let location = self.storage.object_url(&key)?;

        tracing::info!(
            owner_id = %owner_id,
            key = %key,
            original_bytes,
            stored_bytes,
            "image uploaded"
        );
        Ok(StoredImage { key, location })
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Scales to a fixed width, keeping the aspect ratio, and re-encodes as JPEG.
pub fn recompress(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let image = image::load_from_memory(data)
        .map_err(|err| anyhow!("failed to decode image: {}", err))?;
    let resized = image.resize(TARGET_WIDTH, u32::MAX, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|err| anyhow!("failed to encode jpeg: {}", err))?;
    Ok(buf)
}
