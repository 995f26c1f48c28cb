use serde::Deserialize;

use super::DecodeError;

/// Stream properties reported by ffprobe for the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// 0 when the container does not record a frame count.
    pub total_frame_count: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Arguments for `ffprobe` that print the fields [`parse_probe`] reads.
pub fn probe_args(path: &str) -> [&str; 10] {
    [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
        "-of",
        "json",
        "-i",
        path,
    ]
}

/// Parse `ffprobe -of json` output into [`VideoInfo`].
///
/// `avg_frame_rate` wins over `r_frame_rate`; `0/0` and `N/A` count as absent.
pub fn parse_probe(json: &[u8]) -> Result<VideoInfo, DecodeError> {
    let output: ProbeOutput = serde_json::from_slice(json)?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or(DecodeError::NoVideoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| DecodeError::InvalidFrameRate {
            avg: stream.avg_frame_rate.clone(),
            r: stream.r_frame_rate.clone(),
        })?;

    let total_frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        total_frame_count,
    })
}

/// Parse a rational like `30000/1001` (or a plain number) into a positive rate.
fn parse_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
