mod gemini;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AnalysisResult, MediaPayload};

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result of an edit request: an edited image, a textual explanation of why
/// the instruction was not actionable, or neither (surfaced as an error by
/// the session layer).
#[derive(Debug, Clone, Default)]
pub struct EditOutcome {
    pub image: Option<MediaPayload>,
    pub text: Option<String>,
}

impl EditOutcome {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.text.is_none()
    }
}

/// Remote vision model contract. Single-shot calls, no streaming; timeouts
/// are enforced inside implementations, so a hung request surfaces here as a
/// plain failure. Retry policy is the caller's business.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze_image(&self, payload: &MediaPayload) -> Result<AnalysisResult, AnalysisError>;

    async fn analyze_video(&self, payload: &MediaPayload) -> Result<AnalysisResult, AnalysisError>;

    async fn edit_image(
        &self,
        payload: &MediaPayload,
        instruction: &str,
    ) -> Result<EditOutcome, AnalysisError>;
}
