use figure_judge_common::frame::timestamp_sec;
use image::RgbImage;
use tracing::debug;

use crate::decoder::RawFrame;
use crate::filter::FrameFilter;

/// A sampled frame that passed the information filter.
#[derive(Debug, Clone)]
pub struct CandidateFrame {
    pub index: u64,
    /// `index / frame_rate`, rounded to 2 decimals.
    pub timestamp_sec: f64,
    pub image: RgbImage,
}

/// Sampling interval giving roughly `divisor` evaluation points per video.
///
/// An unknown (zero) frame count, or a video shorter than `divisor` frames,
/// gives a stride of 1.
pub fn stride(total_frame_count: u64, divisor: u64) -> u64 {
    (total_frame_count / divisor.max(1)).max(1)
}

/// Walks decoded frames at a fixed stride and keeps the informative ones.
pub struct FrameSelector {
    stride: u64,
    frame_rate: f64,
    filter: Box<dyn FrameFilter>,
}

impl FrameSelector {
    pub fn new(stride: u64, frame_rate: f64, filter: Box<dyn FrameFilter>) -> Self {
        Self {
            stride: stride.max(1),
            frame_rate,
            filter,
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Whether the frame at `index` is evaluated at all.
    pub fn is_sampled(&self, index: u64) -> bool {
        index % self.stride == 0
    }

    /// Run the filter on a sampled frame; `None` means rejected.
    pub fn evaluate(&mut self, frame: RawFrame) -> Option<CandidateFrame> {
        if !self.filter.should_keep(&frame.image) {
            debug!(index = frame.index, filter = self.filter.name(), "frame rejected");
            return None;
        }
        Some(CandidateFrame {
            index: frame.index,
            timestamp_sec: timestamp_sec(frame.index, self.frame_rate),
            image: frame.image,
        })
    }
}
