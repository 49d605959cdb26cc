//! Capture session: the ordered set of photos for one physical receipt.
//!
//! A multi-page receipt is photographed page by page; the session holds the
//! preprocessed pages in capture order until the whole set is handed to
//! extraction and persistence in one piece. Ordinals are *positions*, not
//! stable ids — removing page 0 renumbers the rest — so per-image UI must
//! index against the current order, never against a remembered ordinal.

use crate::error::LedgerError;
use crate::model::EncodedImage;
use crate::pipeline::input::decode_data_uri;
use crate::pipeline::preprocess;
use crate::PipelineConfig;

/// One preprocessed page of a receipt, tagged with its capture position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub image: EncodedImage,
    /// Position within the receipt, 0-based, dense.
    pub ordinal: usize,
}

/// Accumulates the preprocessed images of one in-progress receipt.
///
/// The session exclusively owns its images until [`CaptureSession::into_images`]
/// hands them to the rest of the pipeline; `clear` (or submission completing)
/// destroys them.
#[derive(Debug, Default)]
pub struct CaptureSession {
    images: Vec<CapturedImage>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a preprocessed image; returns its ordinal.
    pub fn add(&mut self, image: EncodedImage) -> usize {
        let ordinal = self.images.len();
        self.images.push(CapturedImage { image, ordinal });
        ordinal
    }

    /// Preprocess raw photo bytes and append the result.
    pub fn add_raw(&mut self, raw: &[u8], config: &PipelineConfig) -> Result<usize, LedgerError> {
        let image = preprocess::preprocess(raw, config)?;
        Ok(self.add(image))
    }

    /// Accept a browser-style `data:image/...;base64,...` capture, preprocess
    /// it, and append the result.
    pub fn add_data_uri(&mut self, uri: &str, config: &PipelineConfig) -> Result<usize, LedgerError> {
        let (raw, _mime) = decode_data_uri(uri)?;
        self.add_raw(&raw, config)
    }

    /// Seed a session from an analyze-style request that may carry a legacy
    /// single `image`, a multi-image `images` list, or both.
    ///
    /// Precedence: a non-empty `images` list wins; the legacy field is only
    /// consulted when the list is absent or empty.
    pub fn from_request(
        image: Option<&str>,
        images: &[String],
        config: &PipelineConfig,
    ) -> Result<Self, LedgerError> {
        let mut session = Self::new();
        if !images.is_empty() {
            for uri in images {
                session.add_data_uri(uri, config)?;
            }
        } else if let Some(uri) = image {
            session.add_data_uri(uri, config)?;
        }
        if session.is_empty() {
            return Err(LedgerError::EmptySession);
        }
        Ok(session)
    }

    /// Remove the image at `index`, preserving the relative order of the
    /// rest. Remaining images are renumbered so ordinals stay dense.
    ///
    /// Returns the removed image, or `None` when `index` is out of range.
    pub fn remove(&mut self, index: usize) -> Option<EncodedImage> {
        if index >= self.images.len() {
            return None;
        }
        let removed = self.images.remove(index);
        for (i, captured) in self.images.iter_mut().enumerate() {
            captured.ordinal = i;
        }
        Some(removed.image)
    }

    /// Drop every image in the session.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[CapturedImage] {
        &self.images
    }

    /// Hand the images to extraction/persistence, consuming the session.
    pub fn into_images(self) -> Vec<CapturedImage> {
        self.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(tag: u8) -> EncodedImage {
        EncodedImage {
            bytes: vec![tag],
            mime_type: "image/jpeg".into(),
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn add_assigns_sequential_ordinals() {
        let mut session = CaptureSession::new();
        assert_eq!(session.add(img(0)), 0);
        assert_eq!(session.add(img(1)), 1);
        assert_eq!(session.add(img(2)), 2);
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn remove_preserves_order_and_renumbers() {
        let mut session = CaptureSession::new();
        session.add(img(10));
        session.add(img(20));
        session.add(img(30));

        let removed = session.remove(1).expect("index 1 exists");
        assert_eq!(removed.bytes, vec![20]);

        let images = session.images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image.bytes, vec![10]);
        assert_eq!(images[1].image.bytes, vec![30]);
        // Ordinals are dense positions again — no gap, no duplicate.
        assert_eq!(images[0].ordinal, 0);
        assert_eq!(images[1].ordinal, 1);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut session = CaptureSession::new();
        session.add(img(1));
        assert!(session.remove(5).is_none());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn clear_empties_the_session() {
        let mut session = CaptureSession::new();
        session.add(img(1));
        session.add(img(2));
        session.clear();
        assert!(session.is_empty());
    }

    fn png_data_uri(side: u32) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use image::{DynamicImage, Rgba, RgbaImage};
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, Rgba([200, 10, 10, 255])))
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode test fixture");
        format!("data:image/png;base64,{}", STANDARD.encode(&buf))
    }

    #[test]
    fn request_with_both_fields_prefers_the_image_list() {
        let config = PipelineConfig::default();
        let legacy = png_data_uri(8);
        let list = vec![png_data_uri(4), png_data_uri(6)];

        let session = CaptureSession::from_request(Some(&legacy), &list, &config).unwrap();
        // The two list pages win; the legacy single image is ignored.
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn request_with_only_the_legacy_field_still_works() {
        let config = PipelineConfig::default();
        let legacy = png_data_uri(8);
        let session = CaptureSession::from_request(Some(&legacy), &[], &config).unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn request_with_no_images_is_rejected() {
        let config = PipelineConfig::default();
        let err = CaptureSession::from_request(None, &[], &config).unwrap_err();
        assert!(matches!(err, LedgerError::EmptySession));
    }
}
