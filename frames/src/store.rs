use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use figure_judge_common::config::{EncodeConfig, EncodeMode};
use figure_judge_common::frame::FramePayload;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const FRAME_EXT: &str = "jpg";
const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Where encoded JPEGs end up: inline in the response, or as files on disk
/// served under a URL prefix.
#[derive(Debug, Clone)]
pub enum FrameStore {
    Inline,
    Disk { dir: PathBuf, url_prefix: String },
}

impl FrameStore {
    pub fn from_config(config: &EncodeConfig) -> Self {
        match config.mode {
            EncodeMode::Inline => Self::Inline,
            EncodeMode::Disk => Self::disk(config.frame_dir.clone(), &config.url_prefix),
        }
    }

    pub fn disk(dir: PathBuf, url_prefix: &str) -> Self {
        let mut url_prefix = url_prefix.to_string();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self::Disk { dir, url_prefix }
    }

    /// Create the frame directory if this store writes to disk.
    pub fn prepare(&self) -> Result<(), StoreError> {
        if let Self::Disk { dir, .. } = self {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Write(dir.clone(), e))?;
            info!(dir = %dir.display(), "frame store ready");
        }
        Ok(())
    }

    /// Materialize one JPEG as a transport payload.
    pub fn put(&self, jpeg: Vec<u8>) -> Result<FramePayload, StoreError> {
        match self {
            Self::Inline => Ok(FramePayload::Inline {
                base64_data: STANDARD.encode(&jpeg),
            }),
            Self::Disk { dir, url_prefix } => {
                let name = format!("{}.{FRAME_EXT}", Uuid::new_v4().simple());
                let path = dir.join(&name);
                if let Err(e) = std::fs::write(&path, &jpeg) {
                    // Don't leave a truncated file behind.
                    let _ = std::fs::remove_file(&path);
                    return Err(StoreError::Write(path, e));
                }
                debug!(path = %path.display(), bytes = jpeg.len(), "stored frame");
                Ok(FramePayload::Stored {
                    url: format!("{url_prefix}{name}"),
                    path,
                })
            }
        }
    }

    /// Resolve a frame reference sent back by a client into JPEG bytes.
    ///
    /// Accepts a stored-frame URL (disk mode only), a bare base64 payload, or
    /// a `data:image/jpeg;base64,` URL.
    pub fn load(&self, reference: &str) -> Result<Vec<u8>, StoreError> {
        let reference = reference.trim();
        if let Self::Disk { dir, url_prefix } = self {
            if let Some(name) = reference.strip_prefix(url_prefix.as_str()) {
                if !is_frame_name(name) {
                    return Err(StoreError::InvalidName(name.to_string()));
                }
                let path = dir.join(name);
                return std::fs::read(&path).map_err(|e| StoreError::Read(path, e));
            }
        }
        if reference.starts_with('/') && reference.ends_with(".jpg") {
            return Err(StoreError::UnknownReference(reference.to_string()));
        }
        let payload = reference.strip_prefix(DATA_URL_PREFIX).unwrap_or(reference);
        Ok(STANDARD.decode(payload)?)
    }

    /// Delete stored frames older than `max_age`. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> Result<usize, StoreError> {
        let Self::Disk { dir, .. } = self else {
            return Ok(0);
        };
        let now = SystemTime::now();
        let entries = std::fs::read_dir(dir).map_err(|e| StoreError::Read(dir.clone(), e))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXT) {
                continue;
            }
            if !is_expired(&path, now, max_age) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete expired frame")
                }
            }
        }
        Ok(removed)
    }
}

fn is_expired(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age >= max_age)
}

/// Names produced by [`FrameStore::put`]: 32 hex digits plus `.jpg`.
fn is_frame_name(name: &str) -> bool {
    match name.strip_suffix(".jpg") {
        Some(stem) => stem.len() == 32 && stem.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid base64 frame data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid stored frame name: {0}")]
    InvalidName(String),
    #[error("frame reference is not served by this store: {0}")]
    UnknownReference(String),
}
