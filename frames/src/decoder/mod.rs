pub mod ffmpeg;
pub mod probe;
#[cfg(all(test, unix))]
pub(crate) mod testing;

use image::RgbImage;

pub use ffmpeg::FfmpegSource;
pub use probe::VideoInfo;

/// One decoded picture and its 0-based position in the stream.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub index: u64,
    pub image: RgbImage,
}

/// A finite, forward-only sequence of decoded frames.
///
/// `frame_rate` and `total_frame_count` are known as soon as the source is
/// open. Either may be approximate; `total_frame_count` is 0 when the
/// container does not say.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    fn frame_rate(&self) -> f64;

    fn total_frame_count(&self) -> u64;

    /// Next frame in order, or `None` at end of stream.
    async fn read_next(&mut self) -> Result<Option<RawFrame>, DecodeError>;

    /// Advance past the next frame without handing it out. Returns `false`
    /// at end of stream.
    async fn skip_next(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_next().await?.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to stage video in a temp file: {0}")]
    TempFile(std::io::Error),
    #[error("failed to run ffprobe: {0}")]
    ProbeSpawn(std::io::Error),
    #[error("ffprobe rejected the input: {0}")]
    ProbeFailed(String),
    #[error("failed to parse ffprobe output: {0}")]
    ProbeParse(#[from] serde_json::Error),
    #[error("no video stream found")]
    NoVideoStream,
    #[error("video stream has invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("could not determine frame rate (avg={avg:?}, r={r:?})")]
    InvalidFrameRate { avg: Option<String>, r: Option<String> },
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(std::io::Error),
    #[error("failed to read decoded frame: {0}")]
    Read(std::io::Error),
    #[error("ffmpeg exited with {0}: {1}")]
    Exited(std::process::ExitStatus, String),
}
