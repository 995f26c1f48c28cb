use figure_judge_common::config::EncodeConfig;
use figure_judge_common::frame::EncodedFrame;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use tracing::debug;

use crate::selector::CandidateFrame;
use crate::store::{FrameStore, StoreError};

/// Shrinks, compresses and stores accepted frames.
pub struct FrameEncoder {
    max_width: u32,
    quality: u8,
    store: FrameStore,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("JPEG compression failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("failed to store encoded frame: {0}")]
    Store(#[from] StoreError),
}

impl FrameEncoder {
    pub fn new(max_width: u32, quality: u8, store: FrameStore) -> Self {
        Self {
            max_width,
            quality: quality.clamp(1, 100),
            store,
        }
    }

    pub fn from_config(config: &EncodeConfig) -> Self {
        Self::new(config.max_width, config.quality, FrameStore::from_config(config))
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Downscale to at most `max_width`, JPEG-compress, and materialize.
    pub fn encode(&self, candidate: CandidateFrame) -> Result<EncodedFrame, EncodeError> {
        let CandidateFrame {
            index,
            timestamp_sec,
            image,
        } = candidate;

        let image = fit_width(image, self.max_width);
        let (width, height) = image.dimensions();
        let jpeg = encode_jpeg(&image, self.quality)?;
        debug!(index, width, height, bytes = jpeg.len(), "encoded frame");

        let payload = self.store.put(jpeg)?;
        Ok(EncodedFrame {
            payload,
            timestamp_sec,
            index,
            width,
            height,
        })
    }
}

/// Output size for a frame limited to `max_width`, keeping the aspect ratio.
///
/// The height is floored and never drops below 1. Frames already narrow
/// enough keep their size.
pub fn scaled_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let new_height = (height as u64 * max_width as u64 / width as u64).max(1) as u32;
    (max_width, new_height)
}

/// Area-averaging downscale to `max_width`; narrower images pass through.
pub fn fit_width(image: RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = scaled_size(width, height, max_width);
    if (new_width, new_height) == (width, height) {
        return image;
    }
    imageops::thumbnail(&image, new_width, new_height)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::EmptyImage { width, height });
    }
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(image)?;
    Ok(jpeg)
}
