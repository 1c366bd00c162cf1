use chrono::{DateTime, Utc};
use common::{AssetRecord, TransformOptions};
use serde::Serialize;
use uuid::Uuid;

/// Transform requested with an upload, echoed back to the client.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ProcessingOptionsResponse {
    #[schema(example = 800)]
    pub width: i32,
    #[schema(example = 600)]
    pub height: i32,
    #[schema(example = 85)]
    pub quality: i32,
    #[schema(example = "png")]
    pub format: String,
    pub thumbnail: bool,
    #[schema(example = "© imgflow")]
    pub watermark_text: String,
}

impl From<&TransformOptions> for ProcessingOptionsResponse {
    fn from(opts: &TransformOptions) -> Self {
        Self {
            width: opts.width,
            height: opts.height,
            quality: opts.quality,
            format: opts.format.clone(),
            thumbnail: opts.thumbnail,
            watermark_text: opts.watermark_text.clone(),
        }
    }
}

/// Response for an accepted upload.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    #[schema(example = "0b0b7f4e-3f2a-4c1d-9d8e-1a2b3c4d5e6f")]
    pub image_id: Uuid,
    /// Where the processed image will be served.
    #[schema(example = "http://localhost:3000/image/0b0b7f4e-3f2a-4c1d-9d8e-1a2b3c4d5e6f")]
    pub result_url: String,
    #[schema(example = "uploaded")]
    pub status: String,
    pub processing_options: ProcessingOptionsResponse,
    #[schema(example = "Image uploaded and queued for processing")]
    pub message: String,
}

/// Processing state of one image.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// One of `uploaded`, `processing`, `completed`, `failed`, `unknown`.
    #[schema(example = "processing")]
    pub status: String,
    #[schema(example = "0b0b7f4e-3f2a-4c1d-9d8e-1a2b3c4d5e6f")]
    pub image_id: Uuid,
    #[schema(example = "http://localhost:3000/image/0b0b7f4e-3f2a-4c1d-9d8e-1a2b3c4d5e6f")]
    pub image_url: Option<String>,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    /// Set once processing completed.
    pub processed_at: Option<DateTime<Utc>>,
    #[schema(example = "Image status: processing")]
    pub message: String,
}

impl From<AssetRecord> for StatusResponse {
    fn from(record: AssetRecord) -> Self {
        Self {
            message: format!("Image status: {}", record.status),
            status: record.status.to_string(),
            image_id: record.id,
            image_url: record.result_ref,
            original_name: record.original_name,
            uploaded_at: record.uploaded_at,
            processed_at: record.processed.map(|p| p.processed_at),
        }
    }
}

/// Response for a deleted image.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    pub image_id: Uuid,
    #[schema(example = "Image deleted")]
    pub message: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "imgflow")]
    pub service: &'static str,
}
