pub mod openai;
pub mod traits;
pub mod types;

pub use openai::OpenAiClient;
pub use traits::{with_timeout, ChatCompletion, ImageGenerator, SpeechSynthesizer, SpeechTranscriber};
pub use types::{
    AudioClip, ChatMessage, ChatRequest, ChatResponse, GeneratedImage, ImageRequest,
    ProviderError, SpeechRequest, TranscriptionRequest,
};
