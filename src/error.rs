use std::borrow::Cow;

use thiserror::Error;

use crate::providers::ProviderError;
use crate::services::audio::DeviceError;
use crate::services::documents::StoreError;

/// Every failure a mentor operation can surface to its caller.
#[derive(Debug, Error)]
pub enum MentorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error("Completion failed: {0}")]
    CompletionFailed(#[source] ProviderError),

    #[error("Image generation failed: {0}")]
    ImageGenerationFailed(#[source] ProviderError),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(#[source] ProviderError),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(#[source] ProviderError),

    #[error("Image download failed: {0}")]
    DownloadFailed(#[source] ProviderError),

    #[error("Could not write file: {0}")]
    SaveFailed(#[from] std::io::Error),

    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MentorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether resubmitting the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MentorError::Validation(_) | MentorError::Config(_) => false,
            MentorError::PersistenceFailed(e) => !e.is_malformed(),
            _ => true,
        }
    }

    /// Short notice for the user; details go to the log. Retryable failures
    /// end with a hint to try again.
    pub fn user_notice(&self) -> Cow<'_, str> {
        let notice = match self {
            MentorError::Validation(message) => return Cow::Borrowed(message.as_str()),
            MentorError::PersistenceFailed(_) => "Could not save your conversation.",
            MentorError::CompletionFailed(_) => "Failed to send message.",
            MentorError::ImageGenerationFailed(_) => "Failed to generate roadmap.",
            MentorError::DownloadFailed(_) => "Could not download the roadmap image.",
            MentorError::SaveFailed(_) => "Could not write the roadmap file.",
            MentorError::SynthesisFailed(_) => "Could not play the reply aloud.",
            MentorError::TranscriptionFailed(_) => "Failed to transcribe audio.",
            MentorError::Device(_) => "Could not access microphone.",
            MentorError::Config(_) => "The mentor is not configured correctly.",
        };
        if self.is_retryable() {
            Cow::Owned(format!("{} Please try again.", notice))
        } else {
            Cow::Borrowed(notice)
        }
    }
}
