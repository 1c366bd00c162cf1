use std::collections::HashMap;

use axum::Json;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common::TransformOptions;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::models::image::{
    DeleteResponse, HealthResponse, ProcessingOptionsResponse, StatusResponse, UploadResponse,
};
use crate::state::AppState;

const SUPPORTED_FORMATS: &[&str] = &["jpeg", "jpg", "png", "gif"];

/// Body limit for the upload route. Leaves headroom for the multipart envelope.
pub fn upload_body_limit(max_upload_size: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_upload_size.saturating_add(64 * 1024))
}

#[utoipa::path(
    post,
    path = "/image/upload",
    tag = "Images",
    operation_id = "uploadImage",
    summary = "Upload an image for processing",
    description = "Stores the `image` multipart field and queues it for processing. \
        Optional fields: `width`, `height`, `quality` (1-100), `format` (jpeg, png, gif), \
        `watermark`, `thumbnail` (true/false).",
    request_body(content_type = "multipart/form-data", description = "Image and processing options"),
    responses(
        (status = 202, description = "Image accepted", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 503, description = "Store unavailable (SERVICE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "image" {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation("Image field must have a filename".into()))?;
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read image: {e}")))?;
            image = Some((filename, data.to_vec()));
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read {name}: {e}")))?;
            fields.insert(name, text);
        }
    }

    let (filename, data) =
        image.ok_or_else(|| AppError::Validation("Missing 'image' field".into()))?;

    let max = state.config.server.max_upload_size;
    if data.len() > max {
        return Err(AppError::Validation(format!(
            "Image exceeds the maximum size of {max} bytes"
        )));
    }
    if !infer::is_image(&data) {
        return Err(AppError::Validation(
            "Invalid image file, expected JPEG, PNG or GIF".into(),
        ));
    }

    let options = parse_options(&fields)?;
    let receipt = state.assets.upload(&data, &filename, options.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            image_id: receipt.asset_id,
            result_url: receipt.result_ref,
            status: receipt.status.to_string(),
            processing_options: ProcessingOptionsResponse::from(&options),
            message: "Image uploaded and queued for processing".into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/image/{id}",
    tag = "Images",
    operation_id = "getImage",
    summary = "Fetch a processed image",
    description = "Returns the processed bytes once processing completed, \
        otherwise the current status as JSON.",
    params(("id" = Uuid, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Processed image bytes, or status while pending", body = StatusResponse),
        (status = 404, description = "Image not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let processed = state.assets.get_processed(id).await?;

    match processed.data {
        Some(bytes) => Response::builder()
            .header(header::CONTENT_TYPE, processed.record.format.as_str())
            .header(header::CONTENT_LENGTH, bytes.len())
            .body(Body::from(bytes))
            .map_err(|e| AppError::Internal(e.to_string())),
        None => Ok(Json(StatusResponse::from(processed.record)).into_response()),
    }
}

#[utoipa::path(
    get,
    path = "/image/{id}/status",
    tag = "Images",
    operation_id = "getImageStatus",
    summary = "Get the processing status of an image",
    params(("id" = Uuid, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
        (status = 404, description = "Image not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_image_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let record = state.assets.get_asset(id).await?;
    Ok(Json(StatusResponse::from(record)))
}

#[utoipa::path(
    delete,
    path = "/image/{id}",
    tag = "Images",
    operation_id = "deleteImage",
    summary = "Delete an image",
    description = "Removes the record and both stored copies.",
    params(("id" = Uuid, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Image deleted", body = DeleteResponse),
        (status = 404, description = "Image not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.assets.delete_asset(id).await?;
    Ok(Json(DeleteResponse {
        image_id: id,
        message: "Image deleted".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "healthCheck",
    summary = "Liveness probe",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        service: "imgflow",
    })
}

/// Build transform options from the text fields of an upload form.
///
/// Absent or blank fields keep their defaults.
pub fn parse_options(fields: &HashMap<String, String>) -> Result<TransformOptions, AppError> {
    let get = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };
    let mut opts = TransformOptions::default();

    if let Some(v) = get("width") {
        opts.width = parse_positive("width", v)?;
    }
    if let Some(v) = get("height") {
        opts.height = parse_positive("height", v)?;
    }
    if let Some(v) = get("quality") {
        opts.quality = v
            .parse()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .ok_or_else(|| {
                AppError::Validation("Invalid quality: must be between 1 and 100".into())
            })?;
    }
    if let Some(v) = get("format") {
        let format = v.to_ascii_lowercase();
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(AppError::Validation(
                "Invalid format: supported formats are jpeg, png, gif".into(),
            ));
        }
        opts.format = format;
    }
    if let Some(v) = get("watermark") {
        opts.watermark_text = v.to_string();
    }
    if let Some(v) = get("thumbnail") {
        opts.thumbnail = v.parse().map_err(|_| {
            AppError::Validation("Invalid thumbnail value: must be true or false".into())
        })?;
    }

    Ok(opts)
}

fn parse_positive(field: &str, value: &str) -> Result<i32, AppError> {
    value
        .parse::<i32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| AppError::Validation(format!("Invalid {field}: must be a positive integer")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_options_defaults() {
        let opts = parse_options(&HashMap::new()).unwrap();
        assert_eq!(opts, TransformOptions::default());

        let opts = parse_options(&form(&[("width", "  "), ("format", "")])).unwrap();
        assert_eq!(opts, TransformOptions::default());
    }

    #[test]
    fn test_parse_options_all_fields() {
        let opts = parse_options(&form(&[
            ("width", "800"),
            ("height", "600"),
            ("quality", "70"),
            ("format", "PNG"),
            ("watermark", "© imgflow"),
            ("thumbnail", "true"),
        ]))
        .unwrap();

        assert_eq!(opts.width, 800);
        assert_eq!(opts.height, 600);
        assert_eq!(opts.quality, 70);
        assert_eq!(opts.format, "png");
        assert_eq!(opts.watermark_text, "© imgflow");
        assert!(opts.thumbnail);
    }

    #[test]
    fn test_parse_options_rejects_bad_values() {
        for pairs in [
            [("width", "-5")],
            [("height", "abc")],
            [("quality", "0")],
            [("quality", "101")],
            [("format", "bmp")],
            [("thumbnail", "maybe")],
        ] {
            let err = parse_options(&form(&pairs)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{pairs:?}");
        }
    }
}
