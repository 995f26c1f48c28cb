//! Downstream judging: prompt construction, rubric loading and the
//! multimodal model client that turns selected frames into an assessment.

pub mod client;
pub mod gemini;
pub mod judge;
pub mod prompt;
pub mod rubric;

pub use client::{Completion, JudgeModel, ModelError, Part};
pub use gemini::GeminiClient;
pub use judge::{judge, JudgeError, JudgeRequest, BLOCKED_MESSAGE};
pub use prompt::build_prompt;
pub use rubric::{Rubric, RubricError, DEFAULT_GUIDANCE};
