use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use url::Url;

use super::models::*;
use crate::models::Role;
use crate::providers::traits::{ChatCompletion, ImageGenerator, SpeechSynthesizer, SpeechTranscriber};
use crate::providers::types::{
    AudioClip, ChatMessage, ChatRequest, ChatResponse, GeneratedImage, ImageRequest,
    ProviderError, SpeechRequest, TranscriptionRequest,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_SPEECH_MIME: &str = "audio/mpeg";
const INLINE_IMAGE_MIME: &str = "image/png";

/// Client for the OpenAI HTTP API (or any server exposing the same routes).
///
/// One client serves all four collaborator traits: chat completion, image
/// generation, speech synthesis and transcription.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Url, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: Self::normalize_base(base_url),
        })
    }

    /// `Url::join` drops the last path segment unless it ends with a slash.
    fn normalize_base(mut base: Url) -> Url {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn translate_role(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn build_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: Self::translate_role(&msg.role).to_string(),
                content: Some(msg.content.clone()),
            })
            .collect()
    }

    fn build_auth_header(api_key: &str) -> Option<String> {
        if api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", api_key))
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match Self::build_auth_header(&self.api_key) {
            Some(auth) => req.header("Authorization", auth),
            None => req,
        }
    }

    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        Ok(response)
    }

    fn parse_chat_response(response: OpenAiResponse, requested_model: String) -> Result<ChatResponse, ProviderError> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        let (tokens_in, tokens_out) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(ChatResponse {
            content,
            model: response.model.unwrap_or(requested_model),
            tokens_in,
            tokens_out,
        })
    }

    fn parse_image_response(response: OpenAiImageResponse) -> Result<GeneratedImage, ProviderError> {
        let first = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No image in response".to_string()))?;

        if let Some(url) = first.url.filter(|u| !u.is_empty()) {
            return Ok(GeneratedImage::Url(url));
        }

        match first.b64_json {
            Some(b64) => {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .map_err(|e| ProviderError::InvalidResponse(format!("Bad image payload: {}", e)))?;
                Ok(GeneratedImage::Inline {
                    mime_type: INLINE_IMAGE_MIME.to_string(),
                    data: Bytes::from(data),
                })
            }
            None => Err(ProviderError::InvalidResponse(
                "Image response carried neither url nor b64_json".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.endpoint("chat/completions")?;

        let openai_request = OpenAiRequest {
            model: request.model.clone(),
            messages: Self::build_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let req = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&openai_request);

        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::parse_chat_response(openai_response, request.model)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage, ProviderError> {
        let url = self.endpoint("images/generations")?;

        let body = OpenAiImageRequest {
            model: request.model,
            prompt: request.prompt,
            n: 1,
            size: request.size,
            quality: request.quality,
        };

        let req = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let image_response: OpenAiImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::parse_image_response(image_response)
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes, ProviderError> {
        let url = Url::parse(url)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid image URL '{}': {}", url, e)))?;

        // Hosted images are signed URLs; the API key stays off this request.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        if data.is_empty() {
            return Err(ProviderError::InvalidResponse("Empty image payload".to_string()));
        }
        Ok(data)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, ProviderError> {
        let url = self.endpoint("audio/speech")?;

        let body = OpenAiSpeechRequest {
            model: request.model,
            voice: request.voice,
            input: request.text,
        };

        let req = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_SPEECH_MIME)
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if data.is_empty() {
            return Err(ProviderError::InvalidResponse("Empty audio payload".to_string()));
        }

        Ok(AudioClip { mime_type, data })
    }
}

#[async_trait]
impl SpeechTranscriber for OpenAiClient {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, ProviderError> {
        let url = self.endpoint("audio/transcriptions")?;

        let file_name = format!("audio.{}", request.audio.file_extension());
        let part = Part::bytes(request.audio.data.to_vec())
            .file_name(file_name)
            .mime_str(&request.audio.mime_type)
            .map_err(|e| ProviderError::RequestFailed(format!("Bad audio mime type: {}", e)))?;
        let form = Form::new().part("file", part).text("model", request.model);

        let req = self.client.post(url).multipart(form);

        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let transcription: OpenAiTranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(transcription.text)
    }
}
