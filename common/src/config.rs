use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on an uploaded video, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Videos whose frames exceed this many pixels are rejected at open.
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
}

/// Tunables for stride sampling, the contrast filter and the frame window.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// `stride = max(1, total_frames / stride_divisor)`.
    #[serde(default = "default_stride_divisor")]
    pub stride_divisor: u64,
    /// Maximum number of frames kept (K).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Minimum luma standard deviation for a frame to count as informative.
    #[serde(default = "default_min_stddev")]
    pub min_stddev: f64,
    #[serde(default)]
    pub scan_policy: ScanPolicy,
}

/// What the selector does once the frame window is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Keep scanning to the end and retain the last K qualifying frames.
    #[default]
    SlidingWindow,
    /// Stop decoding as soon as K qualifying frames are buffered.
    StopWhenFull,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// JPEG quality, 1..=100.
    #[serde(default = "default_jpeg_quality")]
    pub quality: u8,
    #[serde(default)]
    pub mode: EncodeMode,
    /// Directory for stored frames in `disk` mode.
    #[serde(default = "default_frame_dir")]
    pub frame_dir: PathBuf,
    /// URL prefix under which `frame_dir` is served.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

/// How encoded frames leave the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    /// Base64 JPEG payload embedded in the response.
    #[default]
    Inline,
    /// JPEG written to `frame_dir`, response carries a URL.
    Disk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Stored frames older than this are deleted by the sweep.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_rubric_path")]
    pub rubric_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            max_pixels: default_max_pixels(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            stride_divisor: default_stride_divisor(),
            capacity: default_capacity(),
            min_stddev: default_min_stddev(),
            scan_policy: ScanPolicy::default(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            quality: default_jpeg_quality(),
            mode: EncodeMode::default(),
            frame_dir: default_frame_dir(),
            url_prefix: default_url_prefix(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            max_age_secs: default_max_age(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout(),
            rubric_path: default_rubric_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decoder.max_pixels == 0 {
            return Err(ConfigError::Invalid("decoder.max_pixels must be at least 1".into()));
        }
        let s = &self.selection;
        if s.capacity == 0 {
            return Err(ConfigError::Invalid("selection.capacity must be at least 1".into()));
        }
        if s.stride_divisor == 0 {
            return Err(ConfigError::Invalid("selection.stride_divisor must be at least 1".into()));
        }
        if !s.min_stddev.is_finite() || s.min_stddev < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "selection.min_stddev must be a non-negative number, got {}",
                s.min_stddev
            )));
        }
        let e = &self.encode;
        if e.max_width == 0 {
            return Err(ConfigError::Invalid("encode.max_width must be at least 1".into()));
        }
        if !(1..=100).contains(&e.quality) {
            return Err(ConfigError::Invalid(format!(
                "encode.quality must be within 1..=100, got {}",
                e.quality
            )));
        }
        if e.mode == EncodeMode::Disk && e.url_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid(format!(
                "encode.url_prefix must name a path such as \"/frames/\", got {:?}",
                e.url_prefix
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".into()
}
fn default_ffprobe_path() -> String {
    "ffprobe".into()
}
fn default_max_pixels() -> u64 {
    // 8K UHD
    7680 * 4320
}
fn default_stride_divisor() -> u64 {
    10
}
fn default_capacity() -> usize {
    6
}
fn default_min_stddev() -> f64 {
    10.0
}
fn default_max_width() -> u32 {
    800
}
fn default_jpeg_quality() -> u8 {
    75
}
fn default_frame_dir() -> PathBuf {
    PathBuf::from("temp_frames")
}
fn default_url_prefix() -> String {
    "/frames/".into()
}
fn default_check_interval() -> u64 {
    60
}
fn default_max_age() -> u64 {
    3600
}
fn default_model_name() -> String {
    "gemini-2.5-flash".into()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_max_output_tokens() -> u32 {
    8000
}
fn default_request_timeout() -> u64 {
    120
}
fn default_rubric_path() -> PathBuf {
    PathBuf::from("as_judging.json")
}
fn default_log_level() -> String {
    "info".into()
}
