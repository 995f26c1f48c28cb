use bytes::Bytes;
use figure_judge_common::config::{Config, DecoderConfig, ScanPolicy, SelectionConfig};
use figure_judge_common::frame::EncodedFrame;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, info, warn};

use crate::buffer::FrameBuffer;
use crate::decoder::{DecodeError, FfmpegSource, FrameSource};
use crate::encoder::FrameEncoder;
use crate::filter::ContrastFilter;
use crate::selector::{stride, CandidateFrame, FrameSelector};

/// Message returned to callers when the upload cannot be decoded.
pub const OPEN_FAILED_MESSAGE: &str = "Could not open video file.";

/// Lifecycle of one extraction.
///
/// `Idle -> Decoding -> Scanning -> Flushing -> Done`, or
/// `Decoding -> Failed` when the video cannot be opened or yields no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Decoding,
    Scanning,
    Flushing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Decoding => "DECODING",
            Self::Scanning => "SCANNING",
            Self::Flushing => "FLUSHING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub decoded: u64,
    pub sampled: u64,
    pub accepted: u64,
    pub evicted: u64,
    pub encode_failures: u64,
}

/// Outcome of one pipeline run. Never an error: a video that cannot be
/// opened yields no frames, `Failed`, and a diagnostic.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Ascending by timestamp, at most `capacity` long.
    pub frames: Vec<EncodedFrame>,
    pub diagnostic: Option<String>,
    pub state: PipelineState,
    pub stats: ScanStats,
}

impl Extraction {
    fn failed(diagnostic: &str) -> Self {
        Self {
            frames: Vec::new(),
            diagnostic: Some(diagnostic.to_string()),
            state: PipelineState::Failed,
            stats: ScanStats::default(),
        }
    }
}

/// Result of the scanning stage alone, before anything is encoded.
#[derive(Debug)]
pub struct Scan {
    pub candidates: Vec<CandidateFrame>,
    pub stats: ScanStats,
    /// Set when decoding broke off before the end of the stream.
    pub error: Option<DecodeError>,
}

/// Walk `source` once, sampling every `stride`-th frame, filtering, and
/// keeping a bounded window of the accepted frames.
pub async fn scan<S: FrameSource>(source: &mut S, selection: &SelectionConfig) -> Scan {
    let stride = stride(source.total_frame_count(), selection.stride_divisor);
    let mut selector = FrameSelector::new(
        stride,
        source.frame_rate(),
        Box::new(ContrastFilter::new(selection.min_stddev)),
    );
    let capacity = NonZeroUsize::new(selection.capacity).unwrap_or(NonZeroUsize::MIN);
    let mut window = FrameBuffer::new(capacity);
    let mut stats = ScanStats::default();
    let mut error = None;

    debug!(
        stride,
        total_frames = source.total_frame_count(),
        fps = source.frame_rate(),
        capacity = capacity.get(),
        policy = ?selection.scan_policy,
        "scan started"
    );

    loop {
        let index = stats.decoded;
        if !selector.is_sampled(index) {
            match source.skip_next().await {
                Ok(true) => {
                    stats.decoded += 1;
                    continue;
                }
                Ok(false) => break,
                Err(e) => {
                    warn!(error = %e, decoded = stats.decoded, "decoding stopped early");
                    error = Some(e);
                    break;
                }
            }
        }

        let frame = match source.read_next().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, decoded = stats.decoded, "decoding stopped early");
                error = Some(e);
                break;
            }
        };
        stats.decoded += 1;
        stats.sampled += 1;

        let Some(candidate) = run_cpu(|| selector.evaluate(frame)) else {
            continue;
        };
        stats.accepted += 1;
        debug!(index = candidate.index, ts = candidate.timestamp_sec, "frame accepted");

        if let Some(evicted) = window.offer(candidate) {
            stats.evicted += 1;
            debug!(index = evicted.index, "window full, evicted oldest frame");
        }

        if selection.scan_policy == ScanPolicy::StopWhenFull && window.is_full() {
            debug!(index = stats.decoded, "window full, stopping scan");
            break;
        }
    }

    Scan {
        candidates: window.into_vec(),
        stats,
        error,
    }
}

/// Video in, a handful of representative encoded frames out.
pub struct Pipeline {
    decoder: DecoderConfig,
    selection: SelectionConfig,
    encoder: FrameEncoder,
}

impl Pipeline {
    pub fn new(decoder: DecoderConfig, selection: SelectionConfig, encoder: FrameEncoder) -> Self {
        Self {
            decoder,
            selection,
            encoder,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.decoder.clone(),
            config.selection.clone(),
            FrameEncoder::from_config(&config.encode),
        )
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Decode `video` with ffmpeg and select frames from it.
    ///
    /// The staged temp file and the ffmpeg process live inside the source and
    /// are released when this future completes or is dropped.
    pub async fn extract(&self, video: Bytes) -> Extraction {
        let mut state = PipelineState::Idle;
        transition(&mut state, PipelineState::Decoding);

        let source = match FfmpegSource::open(video, &self.decoder).await {
            Ok(source) => source,
            Err(e) => {
                warn!(error = %e, "failed to open video");
                transition(&mut state, PipelineState::Failed);
                return Extraction::failed(OPEN_FAILED_MESSAGE);
            }
        };
        self.run(source, state).await
    }

    /// Select frames from an already opened source.
    pub async fn extract_from<S: FrameSource>(&self, source: S) -> Extraction {
        let mut state = PipelineState::Idle;
        transition(&mut state, PipelineState::Decoding);
        self.run(source, state).await
    }

    async fn run<S: FrameSource>(&self, mut source: S, mut state: PipelineState) -> Extraction {
        transition(&mut state, PipelineState::Scanning);
        let Scan {
            candidates,
            mut stats,
            error,
        } = scan(&mut source, &self.selection).await;
        drop(source);

        if let (Some(e), 0) = (&error, stats.decoded) {
            warn!(error = %e, "no frames could be decoded");
            transition(&mut state, PipelineState::Failed);
            return Extraction::failed(OPEN_FAILED_MESSAGE);
        }

        transition(&mut state, PipelineState::Flushing);
        let mut frames = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let index = candidate.index;
            match run_cpu(|| self.encoder.encode(candidate)) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    stats.encode_failures += 1;
                    warn!(index, error = %e, "failed to encode frame, skipping");
                }
            }
        }

        transition(&mut state, PipelineState::Done);
        info!(
            frames = frames.len(),
            decoded = stats.decoded,
            sampled = stats.sampled,
            accepted = stats.accepted,
            evicted = stats.evicted,
            encode_failures = stats.encode_failures,
            "frame extraction complete"
        );

        Extraction {
            frames,
            diagnostic: error.map(|e| format!("Decoding stopped early: {e}")),
            state,
            stats,
        }
    }
}

/// Run filter or encode work without stalling other tasks on a
/// multi-threaded runtime. Runs inline anywhere else.
fn run_cpu<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = %state, to = %next, "pipeline state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawFrame;
    use crate::store::FrameStore;
    use figure_judge_common::config::EncodeConfig;
    use image::{Rgb, RgbImage};
    use std::collections::{BTreeSet, VecDeque};

    /// In-memory source: textured frames at `busy`, flat gray elsewhere.
    struct MemorySource {
        frame_rate: f64,
        total: u64,
        frames: VecDeque<RawFrame>,
        fail_at: Option<u64>,
    }

    impl MemorySource {
        fn new(len: u64, frame_rate: f64, busy: &[u64]) -> Self {
            Self::sized(len, frame_rate, busy, 16, 16)
        }

        fn sized(len: u64, frame_rate: f64, busy: &[u64], width: u32, height: u32) -> Self {
            let busy: BTreeSet<u64> = busy.iter().copied().collect();
            let frames = (0..len)
                .map(|index| RawFrame {
                    index,
                    image: if busy.contains(&index) {
                        checkerboard(width, height)
                    } else {
                        RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
                    },
                })
                .collect();
            Self {
                frame_rate,
                total: len,
                frames,
                fail_at: None,
            }
        }
    }

    impl FrameSource for MemorySource {
        fn frame_rate(&self) -> f64 {
            self.frame_rate
        }

        fn total_frame_count(&self) -> u64 {
            self.total
        }

        async fn read_next(&mut self) -> Result<Option<RawFrame>, DecodeError> {
            let next = self.frames.pop_front();
            if let (Some(frame), Some(fail_at)) = (&next, self.fail_at) {
                if frame.index == fail_at {
                    return Err(DecodeError::Read(std::io::Error::other("corrupt packet")));
                }
            }
            Ok(next)
        }
    }

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([20, 20, 20])
            } else {
                Rgb([230, 230, 230])
            }
        })
    }

    fn pipeline(selection: SelectionConfig) -> Pipeline {
        Pipeline::new(
            DecoderConfig::default(),
            selection,
            FrameEncoder::new(800, 75, FrameStore::Inline),
        )
    }

    fn timestamps(extraction: &Extraction) -> Vec<f64> {
        extraction.frames.iter().map(|f| f.timestamp_sec).collect()
    }

    fn indices(extraction: &Extraction) -> Vec<u64> {
        extraction.frames.iter().map(|f| f.index).collect()
    }

    #[tokio::test]
    async fn selects_sampled_frames_that_pass_the_filter() {
        // 25 is busy but not on the stride, so it is never looked at.
        let source = MemorySource::new(100, 10.0, &[20, 25, 50, 70, 80, 90]);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert!(extraction.diagnostic.is_none());
        assert_eq!(timestamps(&extraction), vec![2.0, 5.0, 7.0, 8.0, 9.0]);
        assert_eq!(extraction.stats.decoded, 100);
        assert_eq!(extraction.stats.sampled, 10);
        assert_eq!(extraction.stats.accepted, 5);
        assert_eq!(extraction.stats.evicted, 0);
    }

    #[tokio::test]
    async fn keeps_only_the_last_k_qualifying_frames() {
        let source = MemorySource::new(100, 10.0, &[0, 10, 20, 30, 40, 50, 60, 70]);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(indices(&extraction), vec![20, 30, 40, 50, 60, 70]);
        assert_eq!(timestamps(&extraction), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(extraction.stats.accepted, 8);
        assert_eq!(extraction.stats.evicted, 2);
    }

    #[tokio::test]
    async fn stop_when_full_keeps_the_first_k() {
        let selection = SelectionConfig {
            scan_policy: ScanPolicy::StopWhenFull,
            ..SelectionConfig::default()
        };
        let source = MemorySource::new(100, 10.0, &[0, 10, 20, 30, 40, 50, 60, 70]);
        let extraction = pipeline(selection).extract_from(source).await;

        assert_eq!(indices(&extraction), vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(extraction.stats.decoded, 51);
        assert_eq!(extraction.stats.evicted, 0);
    }

    #[tokio::test]
    async fn unknown_frame_count_falls_back_to_stride_one() {
        let mut source = MemorySource::new(12, 4.0, &[3, 7]);
        source.total = 0;
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.stats.sampled, 12);
        assert_eq!(indices(&extraction), vec![3, 7]);
        assert_eq!(timestamps(&extraction), vec![0.75, 1.75]);
    }

    #[tokio::test]
    async fn uniform_video_yields_empty_result() {
        let source = MemorySource::new(300, 30.0, &[]);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert!(extraction.frames.is_empty());
        assert!(extraction.diagnostic.is_none());
        assert_eq!(extraction.stats.sampled, 10);
    }

    #[tokio::test]
    async fn result_is_bounded_and_ordered() {
        let busy: Vec<u64> = (0..500).collect();
        for capacity in 1..=8 {
            let selection = SelectionConfig {
                capacity,
                ..SelectionConfig::default()
            };
            let source = MemorySource::new(500, 24.0, &busy);
            let extraction = pipeline(selection).extract_from(source).await;

            assert!(extraction.frames.len() <= capacity);
            let ts = timestamps(&extraction);
            assert!(ts.windows(2).all(|w| w[0] <= w[1]));
            for frame in &extraction.frames {
                let exact = frame.index as f64 / 24.0;
                assert!((frame.timestamp_sec - exact).abs() <= 0.005 + 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn selection_is_deterministic_across_encode_modes() {
        let busy = [0, 5, 15, 20, 35, 40, 45, 55, 60, 65];
        let first = pipeline(SelectionConfig::default())
            .extract_from(MemorySource::new(70, 7.0, &busy))
            .await;
        let second = pipeline(SelectionConfig::default())
            .extract_from(MemorySource::new(70, 7.0, &busy))
            .await;

        let dir = tempfile::tempdir().unwrap();
        let encode = EncodeConfig {
            mode: figure_judge_common::config::EncodeMode::Disk,
            frame_dir: dir.path().to_path_buf(),
            ..EncodeConfig::default()
        };
        let disk = Pipeline::new(
            DecoderConfig::default(),
            SelectionConfig::default(),
            FrameEncoder::from_config(&encode),
        )
        .extract_from(MemorySource::new(70, 7.0, &busy))
        .await;

        assert_eq!(indices(&first), indices(&second));
        assert_eq!(indices(&first), indices(&disk));
        assert!(disk.frames.iter().all(|f| f.url().is_some()));
    }

    #[tokio::test]
    async fn wide_frames_are_downscaled() {
        let source = MemorySource::sized(1, 10.0, &[0], 1600, 900);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.frames.len(), 1);
        assert_eq!(extraction.frames[0].width, 800);
        assert_eq!(extraction.frames[0].height, 450);
    }

    #[tokio::test]
    async fn encode_failures_are_isolated() {
        // With a zero threshold the empty frame passes the filter but cannot be encoded.
        let selection = SelectionConfig {
            min_stddev: 0.0,
            ..SelectionConfig::default()
        };
        let mut source = MemorySource::new(3, 1.0, &[0, 2]);
        source.frames[1].image = RgbImage::new(0, 0);
        let extraction = pipeline(selection).extract_from(source).await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert_eq!(indices(&extraction), vec![0, 2]);
        assert_eq!(extraction.stats.accepted, 3);
        assert_eq!(extraction.stats.encode_failures, 1);
    }

    #[tokio::test]
    async fn read_error_keeps_frames_found_so_far() {
        let mut source = MemorySource::new(100, 10.0, &[10, 20, 60]);
        source.fail_at = Some(45);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert_eq!(indices(&extraction), vec![10, 20]);
        assert!(extraction
            .diagnostic
            .as_deref()
            .is_some_and(|d| d.contains("corrupt packet")));
    }

    #[tokio::test]
    async fn unopenable_video_fails_with_diagnostic() {
        let decoder = DecoderConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".into(),
            ffprobe_path: "/nonexistent/ffprobe".into(),
            ..DecoderConfig::default()
        };
        let pipeline = Pipeline::new(
            decoder,
            SelectionConfig::default(),
            FrameEncoder::new(800, 75, FrameStore::Inline),
        );
        let extraction = pipeline.extract(Bytes::from_static(b"garbage")).await;

        assert_eq!(extraction.state, PipelineState::Failed);
        assert!(extraction.frames.is_empty());
        assert_eq!(extraction.diagnostic.as_deref(), Some(OPEN_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn error_before_any_frame_fails() {
        let mut source = MemorySource::new(10, 10.0, &[0]);
        source.fail_at = Some(0);
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(source)
            .await;

        assert_eq!(extraction.state, PipelineState::Failed);
        assert!(extraction.frames.is_empty());
        assert_eq!(extraction.diagnostic.as_deref(), Some(OPEN_FAILED_MESSAGE));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_thread_runtime_selects_the_same_frames() {
        let busy = [0, 10, 20, 30, 40, 50, 60, 70];
        let extraction = pipeline(SelectionConfig::default())
            .extract_from(MemorySource::new(100, 10.0, &busy))
            .await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert_eq!(indices(&extraction), vec![20, 30, 40, 50, 60, 70]);
        assert!(extraction.frames.iter().all(|f| f.width == 16));
    }

    #[cfg(unix)]
    fn ffmpeg_pipeline(dir: &std::path::Path, ffmpeg_body: &str) -> Pipeline {
        Pipeline::new(
            crate::decoder::testing::fake_tools(dir, 4, 2, ffmpeg_body),
            SelectionConfig::default(),
            FrameEncoder::new(800, 75, FrameStore::Inline),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ffmpeg_failure_without_frames_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ffmpeg_pipeline(dir.path(), "echo 'moov atom not found' >&2; exit 1");
        let extraction = pipeline.extract(Bytes::from_static(b"garbage")).await;

        assert_eq!(extraction.state, PipelineState::Failed);
        assert!(extraction.frames.is_empty());
        assert_eq!(extraction.diagnostic.as_deref(), Some(OPEN_FAILED_MESSAGE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ffmpeg_failure_after_frames_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        // Two 4x2 frames, top row black and bottom row white, then a crash.
        let pipeline = ffmpeg_pipeline(
            dir.path(),
            "for i in 1 2; do head -c 12 /dev/zero; head -c 12 /dev/zero | tr '\\000' '\\377'; done\n\
             echo 'error while decoding' >&2; exit 1",
        );
        let extraction = pipeline.extract(Bytes::from_static(b"video")).await;

        assert_eq!(extraction.state, PipelineState::Done);
        assert_eq!(indices(&extraction), vec![0, 1]);
        assert_eq!(timestamps(&extraction), vec![0.0, 0.1]);
        let diagnostic = extraction.diagnostic.unwrap();
        assert!(diagnostic.contains("ffmpeg exited"));
        assert!(diagnostic.contains("error while decoding"));
    }

    #[test]
    fn state_names() {
        assert_eq!(PipelineState::Scanning.to_string(), "SCANNING");
        assert_eq!(PipelineState::Failed.to_string(), "FAILED");
    }
}
