use std::io::Cursor;

use common::TransformOptions;
use image::ImageReader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("encode failed: {0}")]
    EncodeFailed(String),
}

/// Result of one transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub width: i32,
    pub height: i32,
    /// File extension of the output, e.g. "png".
    pub format: String,
}

/// Pixel-level transform applied by the process saga.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        data: &[u8],
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError>;
}

/// Returns the source unchanged along with its real dimensions.
///
/// Only accepts images whose header it can read and never converts between
/// formats. Requested geometry is carried on the task but not applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

/// Collapse extension aliases so "jpeg" and "jpg" compare equal.
fn normalize_format(format: &str) -> String {
    match format.trim().to_ascii_lowercase().as_str() {
        "jpeg" => "jpg".into(),
        "tiff" => "tif".into(),
        other => other.into(),
    }
}

/// Pixel size read from the image header, without decoding the pixels.
fn dimensions(data: &[u8]) -> Result<(i32, i32), TransformError> {
    let (width, height) = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TransformError::DecodeFailed(e.to_string()))?
        .into_dimensions()
        .map_err(|e| TransformError::DecodeFailed(e.to_string()))?;

    let width = i32::try_from(width)
        .map_err(|_| TransformError::DecodeFailed(format!("width {width} out of range")))?;
    let height = i32::try_from(height)
        .map_err(|_| TransformError::DecodeFailed(format!("height {height} out of range")))?;
    Ok((width, height))
}

impl Transformer for PassthroughTransformer {
    fn transform(
        &self,
        data: &[u8],
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        if data.is_empty() {
            return Err(TransformError::DecodeFailed("empty input".into()));
        }

        let kind = infer::get(data)
            .ok_or_else(|| TransformError::UnsupportedFormat("unrecognized data".into()))?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(TransformError::UnsupportedFormat(kind.mime_type().into()));
        }

        let source = normalize_format(kind.extension());
        let target = normalize_format(options.output_format(&source));
        if target != source {
            return Err(TransformError::EncodeFailed(format!(
                "cannot convert {source} to {target}"
            )));
        }

        let (width, height) = dimensions(data)?;

        Ok(TransformOutput {
            bytes: data.to_vec(),
            width,
            height,
            format: source,
        })
    }
}
