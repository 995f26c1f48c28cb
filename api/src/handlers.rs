use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use figure_judge_common::frame::EncodedFrame;
use figure_judge_frames::{FrameStore, PipelineState};
use figure_judge_model::{judge, JudgeError, JudgeRequest, Rubric};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub frames: Vec<EncodedFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JudgeResponse {
    pub llm_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_frames: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
}

impl JudgeResponse {
    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            llm_output: format!("Error: {message}"),
            num_frames: None,
            figure_name: None,
            observations: None,
        }
    }
}

/// One entry of the judging frame list: a bare base64 string or `/frames/`
/// URL, or a frame object as returned by `/extract_frames`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FrameRef {
    Reference(String),
    Inline { base64_data: String },
    Stored { url: String },
}

impl FrameRef {
    fn reference(&self) -> &str {
        match self {
            Self::Reference(r) => r,
            Self::Inline { base64_data } => base64_data,
            Self::Stored { url } => url,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JPEG bytes for every entry the store can resolve, in order. Entries that
/// fail to resolve are logged and skipped.
pub fn resolve_frames(store: &FrameStore, refs: &[FrameRef]) -> Vec<Vec<u8>> {
    refs.iter()
        .enumerate()
        .filter_map(|(position, frame)| match store.load(frame.reference()) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!(position, error = %e, "skipping unusable frame");
                None
            }
        })
        .collect()
}

/// Accepts the list under `frames` or the older `frame_base64_json` and
/// `frame_urls_json` names.
pub fn parse_frame_list(fields: &HashMap<String, String>) -> Result<Vec<FrameRef>, String> {
    let raw = ["frames", "frame_base64_json", "frame_urls_json"]
        .iter()
        .find_map(|name| fields.get(*name))
        .ok_or_else(|| "Missing 'frames' form field.".to_string())?;
    serde_json::from_str(raw).map_err(|e| format!("Invalid frame list: {e}"))
}

async fn text_fields(multipart: &mut Multipart) -> Result<HashMap<String, String>, String> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|e| e.to_string())?;
        fields.insert(name, value);
    }
    Ok(fields)
}

async fn video_field(multipart: &mut Multipart) -> Result<Option<Bytes>, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        if field.name() == Some("video") {
            return field.bytes().await.map(Some).map_err(|e| e.to_string());
        }
    }
    Ok(None)
}

fn extract_error(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ExtractResponse {
            frames: Vec::new(),
            message: Some(message),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /extract_frames: multipart upload with a `video` field.
pub async fn extract_frames(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let video = match video_field(&mut multipart).await {
        Ok(Some(video)) => video,
        Ok(None) => return extract_error("Missing 'video' upload field.".to_string()),
        Err(e) => {
            warn!(error = %e, "failed to read upload");
            return extract_error(format!("Failed to read upload: {e}"));
        }
    };
    info!(bytes = video.len(), "received video upload");

    let extraction = state.pipeline.extract(video).await;
    if extraction.state == PipelineState::Failed {
        return extract_error(extraction.diagnostic.unwrap_or_default());
    }

    Json(ExtractResponse {
        frames: extraction.frames,
        message: extraction.diagnostic,
    })
    .into_response()
}

/// POST /judge_frames: multipart form with `figure_name`, `observations`
/// and a JSON frame list.
pub async fn judge_frames(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let Some(model) = state.model.clone() else {
        let e = JudgeError::Unavailable(state.config.model.api_key_env.clone());
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(JudgeResponse::error(e))).into_response();
    };

    let mut fields = match text_fields(&mut multipart).await {
        Ok(fields) => fields,
        Err(e) => {
            warn!(error = %e, "failed to read judging form");
            return (StatusCode::BAD_REQUEST, Json(JudgeResponse::error(e))).into_response();
        }
    };
    let Some(figure_name) = fields.remove("figure_name") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JudgeResponse::error("Missing 'figure_name' form field.")),
        )
            .into_response();
    };
    let observations = fields.remove("observations").unwrap_or_default();
    let refs = match parse_frame_list(&fields) {
        Ok(refs) => refs,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(JudgeResponse::error(e))).into_response(),
    };

    let rubric = match Rubric::load(&state.config.model.rubric_path).await {
        Ok(rubric) => rubric,
        Err(e) => {
            error!(error = %e, "failed to load rubric");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(JudgeResponse::error(e))).into_response();
        }
    };

    let store = state.pipeline.encoder().store();
    let frames = resolve_frames(store, &refs);
    let num_frames = frames.len();
    info!(requested = refs.len(), usable = num_frames, figure = %figure_name, "judging request");

    let request = JudgeRequest {
        figure_name: figure_name.clone(),
        observations: observations.clone(),
        frames,
    };
    match judge(model.as_ref(), &rubric, request, state.config.model.max_output_tokens).await {
        Ok(llm_output) => Json(JudgeResponse {
            llm_output,
            num_frames: Some(num_frames),
            figure_name: Some(figure_name),
            observations: Some(observations),
        })
        .into_response(),
        Err(e @ JudgeError::NoFrames) => {
            (StatusCode::BAD_REQUEST, Json(JudgeResponse::error(e))).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(JudgeResponse::error(e))).into_response(),
    }
}
