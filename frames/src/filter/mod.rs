pub mod contrast;
pub mod traits;

pub use contrast::{luma_stddev, ContrastFilter};
pub use traits::FrameFilter;
