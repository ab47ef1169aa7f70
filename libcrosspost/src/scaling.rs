//! Image scaling seam
//!
//! Deciding whether a file must shrink is part of posting; the pixel work
//! is delegated to an [`ImageScaler`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::PlatformError;
use crate::types::{FileType, PostFile, ScalingOptions};

/// Image MIME types a scaler can re-encode
const SCALABLE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

pub fn is_scalable_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    SCALABLE_MIME_TYPES.contains(&mime.as_str())
}

/// Whether a file is an image the scaler can work on
pub fn is_scalable(file_type: FileType, mime: &str) -> bool {
    file_type == FileType::Image && is_scalable_mime(mime)
}

/// Whether `file` exceeds any limit in `options`
pub fn exceeds_limits(file: &PostFile, options: &ScalingOptions) -> bool {
    let record = &file.record;
    let too_big = options
        .max_size
        .is_some_and(|max| file.data.len() as u64 > max);
    let too_wide = options.max_width.is_some_and(|max| record.width > max);
    let too_tall = options.max_height.is_some_and(|max| record.height > max);
    too_big || too_wide || too_tall
}

#[async_trait]
pub trait ImageScaler: Send + Sync {
    /// Return a file that fits `options`, keeping the aspect ratio
    async fn scale(&self, file: PostFile, options: &ScalingOptions)
        -> Result<PostFile, PlatformError>;
}

/// Scaler that hands files back untouched
///
/// Used when no image backend is configured; the platform then decides
/// what to do with oversized media.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughScaler;

#[async_trait]
impl ImageScaler for PassthroughScaler {
    async fn scale(
        &self,
        file: PostFile,
        options: &ScalingOptions,
    ) -> Result<PostFile, PlatformError> {
        if exceeds_limits(&file, options) {
            debug!(
                "{} exceeds scaling limits {:?}; passing through unchanged",
                file.record.name, options
            );
        }
        Ok(file)
    }
}
