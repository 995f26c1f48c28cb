use image::RgbImage;
use tracing::debug;

use super::traits::FrameFilter;

/// Rejects near-uniform frames: blank walls, solid backgrounds, a hand over
/// the lens.
///
/// The frame is reduced to 8-bit luma and its population standard deviation
/// compared against a hard threshold. Frames below it are dropped outright,
/// not ranked lower.
pub struct ContrastFilter {
    min_stddev: f64,
}

impl ContrastFilter {
    pub fn new(min_stddev: f64) -> Self {
        Self { min_stddev }
    }
}

impl FrameFilter for ContrastFilter {
    fn should_keep(&mut self, image: &RgbImage) -> bool {
        let stddev = luma_stddev(image);
        let accepted = stddev >= self.min_stddev;
        debug!(
            stddev = format!("{:.2}", stddev),
            threshold = format!("{:.2}", self.min_stddev),
            accepted,
            "contrast check"
        );
        accepted
    }

    fn name(&self) -> &str {
        "contrast"
    }
}

/// Population standard deviation of the frame's luma channel.
///
/// Luma uses BT.601 weights in 14-bit fixed point, rounded to 8 bits. An
/// empty image has a deviation of 0.
pub fn luma_stddev(image: &RgbImage) -> f64 {
    let mut n: u64 = 0;
    let mut sum: u64 = 0;
    let mut sum_sq: u64 = 0;

    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        let y = luma(r, g, b) as u64;
        n += 1;
        sum += y;
        sum_sq += y * y;
    }

    if n == 0 {
        return 0.0;
    }

    // n^2 * variance, exact in integers.
    let n = n as u128;
    let scaled = n * sum_sq as u128 - (sum as u128) * (sum as u128);
    ((scaled as f64) / ((n * n) as f64)).sqrt()
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    ((r as u32 * R + g as u32 * G + b as u32 * B + (1 << 13)) >> 14) as u8
}
