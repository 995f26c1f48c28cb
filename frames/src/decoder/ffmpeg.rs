use bytes::Bytes;
use figure_judge_common::config::DecoderConfig;
use image::RgbImage;
use std::io::Write;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::probe::{parse_probe, probe_args, VideoInfo};
use super::{DecodeError, FrameSource, RawFrame};

/// How much of ffmpeg's stderr is kept for error reports.
const STDERR_TAIL: usize = 512;

/// Decodes an uploaded video by piping it through the ffmpeg CLI.
///
/// The upload is staged in a uniquely named temp file because ffmpeg wants a
/// seekable input. Dropping the source kills ffmpeg and deletes the temp file,
/// whether decoding finished, failed, or the caller went away.
pub struct FfmpegSource {
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    /// Reused for frames that are skipped rather than handed out.
    scratch: Vec<u8>,
    next_index: u64,
    finished: bool,
    // Declared last so ffmpeg is killed before the file goes away.
    _staged: NamedTempFile,
}

impl FfmpegSource {
    /// Stage `video`, probe it, and start ffmpeg emitting raw RGB24 frames.
    pub async fn open(video: Bytes, config: &DecoderConfig) -> Result<Self, DecodeError> {
        let staged = tokio::task::spawn_blocking(move || stage(&video))
            .await
            .map_err(|e| DecodeError::TempFile(std::io::Error::other(e)))??;
        let path = staged.path().to_string_lossy().into_owned();

        let probe = Command::new(&config.ffprobe_path)
            .args(probe_args(&path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(DecodeError::ProbeSpawn)?;
        if !probe.status.success() {
            let stderr = String::from_utf8_lossy(&probe.stderr);
            return Err(DecodeError::ProbeFailed(stderr.trim().to_string()));
        }
        let info = parse_probe(&probe.stdout)?;
        check_size(&info, config.max_pixels)?;

        // -noautorotate keeps the output size equal to the probed size.
        let mut child = Command::new(&config.ffmpeg_path)
            .args([
                "-v", "error",
                "-nostdin",
                "-noautorotate",
                "-i", path.as_str(),
                "-map", "0:v:0",
                "-vsync", "passthrough",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecodeError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecodeError::Spawn(std::io::Error::other("could not get stdout handle")))?;
        // Drained concurrently so a chatty ffmpeg never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut raw = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut raw).await {
                    debug!(error = %e, "failed to read ffmpeg stderr");
                }
                stderr_tail(&raw)
            })
        });

        debug!(
            width = info.width,
            height = info.height,
            fps = info.frame_rate,
            total_frames = info.total_frame_count,
            staged = %path,
            "ffmpeg decoder started"
        );

        Ok(Self {
            frame_len: info.width as usize * info.height as usize * 3,
            info,
            child,
            stdout,
            stderr,
            scratch: Vec::new(),
            next_index: 0,
            finished: false,
            _staged: staged,
        })
    }

    /// Reap ffmpeg once its output ends. A non-zero exit is an error even
    /// when some frames came through.
    async fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait().await.map_err(DecodeError::Read)?;
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            debug!(frames = self.next_index, "ffmpeg decoder finished");
            Ok(())
        } else {
            warn!(%status, frames = self.next_index, stderr = %stderr, "ffmpeg exited with error");
            Err(DecodeError::Exited(status, stderr))
        }
    }
}

impl FrameSource for FfmpegSource {
    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn total_frame_count(&self) -> u64 {
        self.info.total_frame_count
    }

    async fn read_next(&mut self) -> Result<Option<RawFrame>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        // The image takes ownership of this buffer.
        let mut buf = vec![0u8; self.frame_len];
        if !read_frame(&mut self.stdout, &mut buf).await? {
            self.finish().await?;
            return Ok(None);
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, buf).ok_or_else(|| {
            DecodeError::Read(std::io::Error::other("frame buffer does not match dimensions"))
        })?;

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RawFrame { index, image }))
    }

    async fn skip_next(&mut self) -> Result<bool, DecodeError> {
        if self.finished {
            return Ok(false);
        }
        self.scratch.resize(self.frame_len, 0);
        if !read_frame(&mut self.stdout, &mut self.scratch).await? {
            self.finish().await?;
            return Ok(false);
        }
        self.next_index += 1;
        Ok(true)
    }
}

/// Fill `buf` with one frame. `false` when the stream ends, including on a
/// short trailing frame.
async fn read_frame(stdout: &mut ChildStdout, buf: &mut [u8]) -> Result<bool, DecodeError> {
    match stdout.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(DecodeError::Read(e)),
    }
}

fn check_size(info: &VideoInfo, max_pixels: u64) -> Result<(), DecodeError> {
    if info.width as u64 * info.height as u64 > max_pixels {
        return Err(DecodeError::InvalidDimensions {
            width: info.width,
            height: info.height,
        });
    }
    Ok(())
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn stage(video: &[u8]) -> Result<NamedTempFile, DecodeError> {
    let mut file = tempfile::Builder::new()
        .prefix("figure-judge-")
        .suffix(".mp4")
        .tempfile()
        .map_err(DecodeError::TempFile)?;
    file.write_all(video).map_err(DecodeError::TempFile)?;
    file.flush().map_err(DecodeError::TempFile)?;
    Ok(file)
}
