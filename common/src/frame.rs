use serde::Serialize;
use std::path::PathBuf;

/// The image carried by an encoded frame, either embedded or stored on disk.
///
/// Serialized untagged so the response keeps the field names clients already
/// read: `base64_data` for inline frames, `url` for stored ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FramePayload {
    /// Base64 JPEG bytes.
    Inline { base64_data: String },
    /// JPEG file written to the frame store, reachable at `url`.
    Stored {
        url: String,
        #[serde(skip)]
        path: PathBuf,
    },
}

/// One selected frame, ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedFrame {
    #[serde(flatten)]
    pub payload: FramePayload,
    pub timestamp_sec: f64,
    /// Position of the frame in the decoded sequence.
    pub index: u64,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    /// Returns the base64 data if this frame is inline.
    pub fn base64_data(&self) -> Option<&str> {
        match &self.payload {
            FramePayload::Inline { base64_data } => Some(base64_data),
            _ => None,
        }
    }

    /// Returns the URL if this frame lives in the frame store.
    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            FramePayload::Stored { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Seconds from the start of the video for frame `index`, rounded to 2 decimals.
///
/// Rounding is half-to-even on the exact binary value, so `1/8 s` becomes
/// `0.12`. A non-positive or non-finite frame rate yields `0.0`.
pub fn timestamp_sec(index: u64, frame_rate: f64) -> f64 {
    if !(frame_rate.is_finite() && frame_rate > 0.0) {
        return 0.0;
    }
    let secs = index as f64 / frame_rate;
    // Fixed-precision formatting rounds the exact value, ties to even.
    format!("{secs:.2}").parse().unwrap_or(secs)
}
