//! Frame selection for figure judging.
//!
//! A video is decoded once, front to back. Every `stride`-th frame is checked
//! for contrast; frames that pass go into a fixed-size window that keeps the
//! most recent ones. When the scan ends the window is downscaled, compressed
//! to JPEG and handed back as inline payloads or stored-file URLs.

pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod pipeline;
pub mod selector;
pub mod store;

pub use buffer::FrameBuffer;
pub use decoder::{DecodeError, FfmpegSource, FrameSource, RawFrame};
pub use encoder::{EncodeError, FrameEncoder};
pub use pipeline::{Extraction, Pipeline, PipelineState, ScanStats, OPEN_FAILED_MESSAGE};
pub use selector::{CandidateFrame, FrameSelector};
pub use store::{FrameStore, StoreError};
