use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Guidance used when no rubric file is present.
pub const DEFAULT_GUIDANCE: &str =
    "Apply standard Artistic Swimming rules for technical execution and scoring.";

/// Judging guidelines loaded from a JSON file of the form `{"content": ...}`.
///
/// `content` is usually a string but may be any JSON value; non-string
/// values are embedded in the prompt as compact JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum RubricError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("Invalid JSON in {0}: {1}")]
    Invalid(PathBuf, serde_json::Error),
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            content: Some(serde_json::Value::String(DEFAULT_GUIDANCE.to_string())),
        }
    }
}

impl Rubric {
    /// Read the rubric fresh from disk so edits apply to the next request.
    pub async fn load(path: &Path) -> Result<Self, RubricError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Self::parse(path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "rubric not found, using default guidance");
                Ok(Self::default())
            }
            Err(e) => Err(RubricError::Read(path.to_path_buf(), e)),
        }
    }

    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, RubricError> {
        serde_json::from_slice(bytes).map_err(|e| RubricError::Invalid(path.to_path_buf(), e))
    }

    pub fn guidance(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Null) | None => "No guidelines provided".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let rubric = Rubric::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(rubric.guidance(), DEFAULT_GUIDANCE);
    }

    #[tokio::test]
    async fn loads_string_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.json");
        std::fs::write(&path, r#"{"content": "T1 height, T2 stability, T3 control"}"#).unwrap();
        let rubric = Rubric::load(&path).await.unwrap();
        assert_eq!(rubric.guidance(), "T1 height, T2 stability, T3 control");
    }

    #[test]
    fn structured_content_is_embedded_as_json() {
        let rubric = Rubric::parse(Path::new("r.json"), br#"{"content": [{"t": "T1", "pv": 2.5}]}"#).unwrap();
        assert_eq!(rubric.guidance(), r#"[{"pv":2.5,"t":"T1"}]"#);
    }

    #[test]
    fn missing_content_key() {
        let rubric = Rubric::parse(Path::new("r.json"), b"{}").unwrap();
        assert_eq!(rubric.guidance(), "No guidelines provided");
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = Rubric::parse(Path::new("as_judging.json"), b"{not json").unwrap_err();
        assert!(matches!(err, RubricError::Invalid(..)));
        assert!(err.to_string().starts_with("Invalid JSON in as_judging.json"));
    }
}
