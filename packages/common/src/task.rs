use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Quality applied when the caller leaves it unset (`<= 0`).
pub const DEFAULT_QUALITY: i32 = 85;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("width and height must be non-negative")]
    NegativeDimensions,
    #[error("quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(i32),
}

/// Transform requested at upload time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Target width; 0 leaves the width alone.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: i32,
    /// Target height; 0 leaves the height alone.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub height: i32,
    /// 1..=100; `<= 0` means "use the default".
    #[serde(default, skip_serializing_if = "is_zero")]
    pub quality: i32,
    /// Output format; empty keeps the source format.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thumbnail: bool,
    /// Empty means no watermark.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub watermark_text: String,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl TransformOptions {
    /// Reject values no transform could honor.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.width < 0 || self.height < 0 {
            return Err(OptionsError::NegativeDimensions);
        }
        if self.quality > 100 {
            return Err(OptionsError::QualityOutOfRange(self.quality));
        }
        Ok(())
    }

    /// Quality with the default applied.
    pub fn effective_quality(&self) -> i32 {
        if self.quality <= 0 {
            DEFAULT_QUALITY
        } else {
            self.quality
        }
    }

    /// Output format, falling back to `source` when none was requested.
    pub fn output_format<'a>(&'a self, source: &'a str) -> &'a str {
        if self.format.is_empty() {
            source
        } else {
            &self.format
        }
    }

    pub fn has_watermark(&self) -> bool {
        !self.watermark_text.is_empty()
    }
}

/// Unit of work handed from the upload path to the process path.
///
/// Immutable once published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTask {
    /// Asset id in canonical string form; parsed by the consumer side.
    pub asset_id: String,
    #[serde(default)]
    pub options: TransformOptions,
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessingTask {
    pub fn new(asset_id: Uuid, options: TransformOptions) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            options,
            enqueued_at: Utc::now(),
        }
    }
}
