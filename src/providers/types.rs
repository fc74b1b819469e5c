use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

// --- Chat types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
}

// --- Image types ---

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
}

/// Where a generated image can be found.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Url(String),
    Inline { mime_type: String, data: Bytes },
}

impl GeneratedImage {
    /// A reference suitable for persisting: the hosted URL, or a `data:` URL
    /// for inline payloads.
    pub fn reference(&self) -> String {
        use base64::Engine;

        match self {
            GeneratedImage::Url(url) => url.clone(),
            GeneratedImage::Inline { mime_type, data } => format!(
                "data:{};base64,{}",
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
        }
    }

    /// Parse a stored reference back: a base64 `data:` URL or an http(s) URL.
    pub fn from_reference(reference: &str) -> Option<GeneratedImage> {
        use base64::Engine;

        if let Some(rest) = reference.strip_prefix("data:") {
            let (mime_type, encoded) = rest.split_once(";base64,")?;
            let data = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
            return Some(GeneratedImage::Inline {
                mime_type: mime_type.to_string(),
                data: Bytes::from(data),
            });
        }

        let url = url::Url::parse(reference).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| GeneratedImage::Url(reference.to_string()))
    }
}

// --- Audio types ---

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub mime_type: String,
    pub data: Bytes,
}

impl AudioClip {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension the transcription endpoint uses to sniff the format.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            "audio/mp4" | "audio/m4a" => "m4a",
            _ => "webm",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub model: String,
    pub voice: String,
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: AudioClip,
    pub model: String,
}
