//! Hand-written fakes for the store, provider and device seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::providers::{
    AudioClip, ChatCompletion, ChatRequest, ChatResponse, GeneratedImage, ImageGenerator,
    ImageRequest, ProviderError, SpeechRequest, SpeechSynthesizer, SpeechTranscriber,
    TranscriptionRequest,
};
use crate::services::audio::{AudioSink, DeviceError, Microphone, Recording};
use crate::services::database::Database;
use crate::services::documents::{Collection, Document, DocumentStore, ListQuery, StoreError};

// --- Store ---

/// In-memory SQLite store that can be told to fail or to report conflicts.
pub struct ScriptedStore {
    inner: Database,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    pending_conflicts: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: Database::new_in_memory().unwrap(),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            pending_conflicts: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `n` updates as if another writer got there first.
    pub fn conflict_next_updates(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn insert(&self, collection: Collection, body: Value) -> Result<Document, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert refused".to_string()));
        }
        self.inner.insert(collection, body).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update refused".to_string()));
        }
        let conflict = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            let expected = expected_version.unwrap_or_default();
            return Err(StoreError::Conflict {
                collection: collection.as_str(),
                id: id.to_string(),
                expected,
                found: expected + 1,
            });
        }
        self.inner.update(collection, id, body, expected_version).await
    }

    async fn list(&self, collection: Collection, query: ListQuery) -> Result<Vec<Document>, StoreError> {
        self.inner.list(collection, query).await
    }
}

fn provider_failure() -> ProviderError {
    ProviderError::RequestFailed("HTTP 500: scripted failure".to_string())
}

// --- Providers ---

pub struct FakeChat {
    reply: String,
    fail_next: AtomicBool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail_next: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(provider_failure());
        }
        Ok(ChatResponse {
            content: self.reply.clone(),
            model,
            tokens_in: Some(12),
            tokens_out: Some(8),
        })
    }
}

/// Image generator. Hosted images fetch as `hosted` bytes.
pub struct FakeImages {
    image: Option<GeneratedImage>,
    hosted: Bytes,
    prompts: Mutex<Vec<String>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeImages {
    fn with_image(image: Option<GeneratedImage>) -> Self {
        Self {
            image,
            hosted: Bytes::from_static(b"hosted png"),
            prompts: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::with_image(Some(GeneratedImage::Url(url.into())))
    }

    pub fn inline(data: &'static [u8]) -> Self {
        Self::with_image(Some(GeneratedImage::Inline {
            mime_type: "image/png".to_string(),
            data: Bytes::from_static(data),
        }))
    }

    pub fn failing() -> Self {
        Self::with_image(None)
    }

    pub fn hosted_bytes(&self) -> Bytes {
        self.hosted.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate_image(&self, request: ImageRequest) -> Result<GeneratedImage, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt);
        self.image.clone().ok_or_else(provider_failure)
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes, ProviderError> {
        self.fetches.lock().unwrap().push(url.to_string());
        Ok(self.hosted.clone())
    }
}

pub struct FakeSpeech {
    fail: bool,
    gate: Option<Notify>,
    called: Notify,
    texts: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn new() -> Self {
        Self {
            fail: false,
            gate: None,
            called: Notify::new(),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Each call waits for one [`open_gate`](Self::open_gate).
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    pub async fn wait_until_called(&self) {
        self.called.notified().await;
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, ProviderError> {
        self.called.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(provider_failure());
        }
        let clip = AudioClip::new("audio/mpeg", request.text.clone().into_bytes());
        self.texts.lock().unwrap().push(request.text);
        Ok(clip)
    }
}

pub struct FakeTranscriber {
    reply: Option<String>,
    gate: Option<Notify>,
    called: Notify,
}

impl FakeTranscriber {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            gate: None,
            called: Notify::new(),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            gate: None,
            called: Notify::new(),
        }
    }

    /// Replies only after [`open_gate`](Self::open_gate).
    pub fn gated(text: impl Into<String>) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::replying(text)
        }
    }

    pub async fn wait_until_called(&self) {
        self.called.notified().await;
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl SpeechTranscriber for FakeTranscriber {
    async fn transcribe(&self, _request: TranscriptionRequest) -> Result<String, ProviderError> {
        self.called.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone().ok_or_else(provider_failure)
    }
}

// --- Devices ---

pub struct FakeMicrophone {
    available: bool,
    fail_stop: bool,
    gate: Option<Notify>,
    opening: Notify,
    opens: AtomicUsize,
    releases: Arc<AtomicUsize>,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self {
            available: true,
            fail_stop: false,
            gate: None,
            opening: Notify::new(),
            opens: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opening the device blocks until [`open_gate`](Self::open_gate).
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    pub async fn wait_until_opening(&self) {
        self.opening.notified().await;
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn failing_on_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::new()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn open(&self) -> Result<Box<dyn Recording>, DeviceError> {
        if !self.available {
            return Err(DeviceError::Unavailable("no input device".to_string()));
        }
        self.opening.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecording {
            fail_stop: self.fail_stop,
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct FakeRecording {
    fail_stop: bool,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl Recording for FakeRecording {
    async fn stop(&mut self) -> Result<AudioClip, DeviceError> {
        if self.fail_stop {
            return Err(DeviceError::Recording("stream closed".to_string()));
        }
        Ok(AudioClip::new("audio/wav", vec![0u8; 32]))
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts concurrent plays. A holding sink plays until cancelled or
/// [`finish_current`](Self::finish_current) is called.
pub struct FakeSink {
    hold: bool,
    plays: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Notify,
    release: Notify,
}

impl FakeSink {
    fn with_hold(hold: bool) -> Self {
        Self {
            hold,
            plays: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn finishing() -> Self {
        Self::with_hold(false)
    }

    pub fn holding() -> Self {
        Self::with_hold(true)
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub async fn wait_until_playing(&self) {
        self.started.notified().await;
    }

    pub fn finish_current(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _clip: AudioClip, cancel: CancellationToken) -> Result<(), DeviceError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.notify_one();

        if self.hold {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.release.notified() => {}
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
