use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::chat::{ChatOrchestrator, SendOutcome};
use super::roadmap::RoadmapService;
use super::side_effects::SideEffectSink;
use super::transcript::TranscriptStore;
use super::voice::{CaptureFlow, CaptureOutcome, CaptureState, PlaybackFlow, PlaybackState};
use crate::error::MentorError;
use crate::models::{CareerPath, Conversation};

/// One user's chat screen: which conversation is open, what is typed in the
/// input field, and the voice controls around it.
pub struct MentorSession {
    transcripts: TranscriptStore,
    orchestrator: Arc<ChatOrchestrator>,
    roadmaps: Arc<RoadmapService>,
    capture: Arc<CaptureFlow>,
    playback: Arc<PlaybackFlow>,
    side_effects: SideEffectSink,
    active: Option<String>,
    input: String,
    last_roadmap: Option<CareerPath>,
}

impl MentorSession {
    pub fn new(
        transcripts: TranscriptStore,
        orchestrator: Arc<ChatOrchestrator>,
        roadmaps: Arc<RoadmapService>,
        capture: Arc<CaptureFlow>,
        playback: Arc<PlaybackFlow>,
        side_effects: SideEffectSink,
    ) -> Self {
        Self {
            transcripts,
            orchestrator,
            roadmaps,
            capture,
            playback,
            side_effects,
            active: None,
            input: String::new(),
            last_roadmap: None,
        }
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn speaking_enabled(&self) -> bool {
        self.playback.speaking_enabled()
    }

    /// Make an existing conversation the active one.
    pub async fn open_conversation(&mut self, id: &str) -> Result<Conversation, MentorError> {
        let conversation = self.transcripts.get_conversation(id).await?;
        info!(conversation_id = %conversation.id, "Opened conversation");
        self.active = Some(conversation.id.clone());
        Ok(conversation)
    }

    /// The next message starts a fresh conversation.
    pub fn start_new_conversation(&mut self) {
        self.active = None;
        self.input.clear();
    }

    pub async fn load_active_conversation(&self) -> Result<Option<Conversation>, MentorError> {
        match &self.active {
            Some(id) => Ok(self.transcripts.find_conversation(id).await?),
            None => Ok(None),
        }
    }

    /// Send `text` in the active conversation, creating one if needed.
    ///
    /// The conversation becomes active as soon as the user message is saved,
    /// so a failed completion still leaves the user looking at it.
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome, MentorError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut saved = None;
        let result = orchestrator
            .send_turn(self.active.as_deref(), text, |id| saved = Some(id.to_string()))
            .await;
        if let Some(id) = saved {
            self.active = Some(id);
        }

        let outcome = result?;
        if self.playback.speaking_enabled() {
            self.playback
                .narrate_in_background(outcome.message.content.clone(), self.side_effects.clone());
        }
        Ok(outcome)
    }

    /// Send whatever is in the input field. The field is cleared on success.
    pub async fn send_input(&mut self) -> Result<SendOutcome, MentorError> {
        let text = self.input.clone();
        let outcome = self.send_message(&text).await?;
        self.input.clear();
        Ok(outcome)
    }

    /// Start or stop voice capture. A finished transcription replaces the
    /// input field.
    pub async fn toggle_recording(&mut self) -> Result<CaptureOutcome, MentorError> {
        let outcome = self.capture.toggle().await?;
        if let CaptureOutcome::Transcribed(text) = &outcome {
            debug!(chars = text.chars().count(), "Transcription placed in input");
            self.input = text.clone();
        }
        Ok(outcome)
    }

    /// Flip spoken replies on or off; returns the new setting.
    pub fn toggle_speaking(&self) -> bool {
        self.playback.toggle_speaking()
    }

    pub async fn generate_roadmap(&mut self) -> Result<CareerPath, MentorError> {
        let id = self
            .active
            .as_deref()
            .ok_or_else(|| MentorError::validation("Start a conversation first."))?;
        let path = self.roadmaps.generate_roadmap(id).await?;
        self.last_roadmap = Some(path.clone());
        Ok(path)
    }

    /// Save the image of the roadmap generated last in this session.
    pub async fn save_roadmap(&self, dest: &Path) -> Result<usize, MentorError> {
        let path = self
            .last_roadmap
            .as_ref()
            .ok_or_else(|| MentorError::validation("Generate a roadmap first."))?;
        self.roadmaps.download_image(path, dest).await
    }
}
