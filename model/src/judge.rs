use tracing::{info, warn};

use crate::client::{JudgeModel, Part};
use crate::prompt::build_prompt;
use crate::rubric::Rubric;

pub const BLOCKED_MESSAGE: &str =
    "## Response Blocked by Safety Filters\n\nTry adjusting your prompt or selecting different frames.";

/// A request to judge one figure from a set of frames.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub figure_name: String,
    pub observations: String,
    /// JPEG bytes, in presentation order.
    pub frames: Vec<Vec<u8>>,
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Gemini client not initialized. Check {0}.")]
    Unavailable(String),
    #[error("No frames were processed for the model.")]
    NoFrames,
}

/// Ask the model for an assessment.
///
/// Model failures and empty completions are not errors: they become the
/// text returned to the user, so the caller can always show something.
pub async fn judge(
    model: &dyn JudgeModel,
    rubric: &Rubric,
    request: JudgeRequest,
    max_output_tokens: u32,
) -> Result<String, JudgeError> {
    if request.frames.is_empty() {
        return Err(JudgeError::NoFrames);
    }

    let count = request.frames.len();
    let mut parts = Vec::with_capacity(count + 1);
    parts.push(Part::Text(build_prompt(
        &request.figure_name,
        &request.observations,
        count,
        &rubric.guidance(),
    )));
    parts.extend(request.frames.into_iter().map(Part::Jpeg));

    info!(model = model.name(), frames = count, figure = %request.figure_name, "sending frames for judging");

    let completion = match model.generate(parts, max_output_tokens).await {
        Ok(completion) => completion,
        Err(e) => {
            warn!(error = %e, "model call failed");
            return Ok(format!("Model call failed: {e}"));
        }
    };

    if !completion.text.trim().is_empty() {
        info!(chars = completion.text.len(), "model call succeeded");
        return Ok(completion.text);
    }

    let reason = completion.finish_reason.as_deref().unwrap_or("UNKNOWN");
    if reason == "SAFETY" {
        warn!("model blocked the response due to safety filters");
        Ok(BLOCKED_MESSAGE.to_string())
    } else {
        warn!(reason, "model returned a blank response");
        Ok(format!(
            "The AI returned a blank response (Reason: {reason}). Check the server logs for details."
        ))
    }
}
