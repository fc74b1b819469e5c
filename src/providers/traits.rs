use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{
    AudioClip, ChatRequest, ChatResponse, GeneratedImage, ImageRequest, ProviderError,
    SpeechRequest, TranscriptionRequest,
};

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage, ProviderError>;

    /// Download the bytes of a hosted image returned by `generate_image`.
    async fn fetch_image(&self, url: &str) -> Result<Bytes, ProviderError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, ProviderError>;
}

#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ProviderError>;
}

/// Run a provider call with a deadline. On expiry the call's future is dropped,
/// which aborts the in-flight HTTP request.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
