//! Image preprocessing: raw capture → bounded-size encoded JPEG.
//!
//! Phone cameras hand us 12-megapixel captures; vision APIs and object
//! storage want something far smaller. This stage decodes whatever the
//! camera produced, downscales it uniformly so the longest side fits the
//! configured maximum, and re-encodes as JPEG — stepping the quality down
//! until the result fits the byte budget or the quality floor is reached.
//! The floor result is accepted even if still over budget, so the loop can
//! never spin unbounded.
//!
//! JPEG is the right codec here (unlike lossless formats for rendered
//! documents): receipts are photographs, and photographic noise compresses
//! poorly as PNG while JPEG at quality 85 keeps the printed digits intact.

use crate::config::PipelineConfig;
use crate::error::LedgerError;
use crate::model::EncodedImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, warn};

/// Decode a raw photo and produce a size-bounded JPEG.
///
/// # Errors
/// [`LedgerError::ImageDecode`] when the source bytes are corrupt or in a
/// format the crate is not built to decode — the caller should prompt for a
/// retake. Nothing is touched beyond the returned buffer; storage is not
/// involved at this stage.
pub fn preprocess(raw: &[u8], config: &PipelineConfig) -> Result<EncodedImage, LedgerError> {
    let decoded = image::load_from_memory(raw).map_err(|e| LedgerError::ImageDecode {
        detail: e.to_string(),
    })?;

    let (src_w, src_h) = (decoded.width(), decoded.height());
    let (dst_w, dst_h) = target_dimensions(src_w, src_h, config.max_dimension);

    let resized = if (dst_w, dst_h) == (src_w, src_h) {
        decoded
    } else {
        debug!("Downscaling {}x{} → {}x{}", src_w, src_h, dst_w, dst_h);
        decoded.resize_exact(dst_w, dst_h, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut quality = config.jpeg_quality;
    let mut bytes = encode_jpeg(&rgb, quality)?;
    while bytes.len() > config.max_encoded_bytes && quality > config.jpeg_quality_floor {
        quality = quality
            .saturating_sub(config.jpeg_quality_step.max(1))
            .max(config.jpeg_quality_floor);
        debug!(
            "Encoded size {} over budget {}, retrying at quality {}",
            bytes.len(),
            config.max_encoded_bytes,
            quality
        );
        bytes = encode_jpeg(&rgb, quality)?;
    }

    if bytes.len() > config.max_encoded_bytes {
        warn!(
            "Image still {} bytes at quality floor {} (budget {}); accepting",
            bytes.len(),
            config.jpeg_quality_floor,
            config.max_encoded_bytes
        );
    }

    Ok(EncodedImage {
        bytes,
        mime_type: "image/jpeg".into(),
        width: dst_w,
        height: dst_h,
    })
}

/// Uniform-scale target dimensions: longest side capped at `max_dimension`,
/// aspect ratio preserved, never upscaled.
fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = f64::from(max_dimension) / f64::from(longest);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w, h)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, LedgerError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    img.write_with_encoder(encoder)
        .map_err(|e| LedgerError::Internal(format!("JPEG encoding failed: {e}")))?;
    Ok(buf)
}
