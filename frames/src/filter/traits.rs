use image::RgbImage;

/// Decides whether a sampled frame carries enough information to keep.
///
/// Implementations see the decoded RGB picture and return `false` for frames
/// that should be dropped without further processing.
pub trait FrameFilter: Send + Sync {
    /// Returns `true` if this frame should be kept as a candidate.
    fn should_keep(&mut self, image: &RgbImage) -> bool;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
