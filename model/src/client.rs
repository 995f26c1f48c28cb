use futures_util::future::BoxFuture;

/// One piece of a multimodal prompt, in the order the model should see it.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// JPEG-compressed image bytes.
    Jpeg(Vec<u8>),
}

/// What came back from a generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Why generation stopped, e.g. `STOP`, `MAX_TOKENS`, `SAFETY`.
    pub finish_reason: Option<String>,
}

/// A text-generation backend that accepts interleaved text and images.
pub trait JudgeModel: Send + Sync {
    fn generate<'a>(
        &'a self,
        parts: Vec<Part>,
        max_output_tokens: u32,
    ) -> BoxFuture<'a, Result<Completion, ModelError>>;

    /// Model identifier for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}
