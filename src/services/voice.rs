use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::audio::{AudioSink, DeviceError, Microphone, Recording};
use super::settings::VoiceSettings;
use super::side_effects::{SideEffectReport, SideEffectSink};
use crate::error::MentorError;
use crate::providers::{
    with_timeout, AudioClip, SpeechRequest, SpeechSynthesizer, SpeechTranscriber,
    TranscriptionRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State stays consistent even if a holder panicked mid-update.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// --- Capture ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Transcribing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The microphone is open and recording.
    Started,
    /// Recording stopped and was transcribed.
    Transcribed(String),
    /// Stop noted while the device was still opening; the pending start
    /// stops and transcribes as soon as the device is ready.
    Stopping,
    /// A previous capture is still being transcribed.
    Busy,
}

/// Owns an open recording. Dropping it gives the device back, so the
/// microphone is released on every path out of the capture flow.
struct RecordingGuard {
    inner: Box<dyn Recording>,
}

impl RecordingGuard {
    async fn finish(mut self) -> Result<AudioClip, DeviceError> {
        self.inner.stop().await
    }
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        self.inner.release();
        debug!("Microphone released");
    }
}

struct CaptureInner {
    state: CaptureState,
    recording: Option<RecordingGuard>,
    stop_requested: bool,
}

/// Resets the flow to idle if the device open fails or is abandoned before
/// the recording is handed over.
struct OpenGuard<'a> {
    inner: &'a Mutex<CaptureInner>,
    armed: bool,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = lock(self.inner);
            inner.state = CaptureState::Idle;
            inner.stop_requested = false;
        }
    }
}

/// Puts the capture flow back to idle when the stop path ends, including
/// when its future is dropped half way.
struct IdleOnDrop<'a>(&'a Mutex<CaptureInner>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        lock(self.0).state = CaptureState::Idle;
    }
}

/// Record → transcribe → text. `idle → recording → transcribing → idle`.
pub struct CaptureFlow {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn SpeechTranscriber>,
    model: String,
    timeout: Duration,
    inner: Mutex<CaptureInner>,
}

impl CaptureFlow {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn SpeechTranscriber>,
        settings: &VoiceSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            model: settings.transcription_model.clone(),
            timeout,
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Idle,
                recording: None,
                stop_requested: false,
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.inner).state
    }

    /// Start recording when idle; stop and transcribe when recording.
    pub async fn toggle(&self) -> Result<CaptureOutcome, MentorError> {
        let recording = {
            let mut inner = lock(&self.inner);
            let state = inner.state;
            match state {
                CaptureState::Idle => {
                    inner.state = CaptureState::Recording;
                    inner.stop_requested = false;
                    None
                }
                CaptureState::Recording => match inner.recording.take() {
                    Some(guard) => {
                        inner.state = CaptureState::Transcribing;
                        Some(guard)
                    }
                    // Still opening the device
                    None => {
                        inner.stop_requested = true;
                        return Ok(CaptureOutcome::Stopping);
                    }
                },
                CaptureState::Transcribing => return Ok(CaptureOutcome::Busy),
            }
        };

        match recording {
            None => self.start().await,
            Some(guard) => self.finish(guard).await,
        }
    }

    async fn start(&self) -> Result<CaptureOutcome, MentorError> {
        let mut reset = OpenGuard {
            inner: &self.inner,
            armed: true,
        };
        let guard = RecordingGuard {
            inner: self.microphone.open().await?,
        };
        reset.armed = false;

        let stop_now = {
            let mut inner = lock(&self.inner);
            if std::mem::take(&mut inner.stop_requested) {
                inner.state = CaptureState::Transcribing;
                Some(guard)
            } else {
                inner.recording = Some(guard);
                None
            }
        };

        match stop_now {
            Some(guard) => {
                debug!("Stop requested while opening, finishing at once");
                self.finish(guard).await
            }
            None => {
                info!("Recording started");
                Ok(CaptureOutcome::Started)
            }
        }
    }

    async fn finish(&self, guard: RecordingGuard) -> Result<CaptureOutcome, MentorError> {
        let _idle = IdleOnDrop(&self.inner);

        // The guard is consumed here; the device is free before transcription.
        let audio = guard.finish().await?;
        debug!(bytes = audio.data.len(), "Recording stopped, transcribing");

        let request = TranscriptionRequest {
            audio,
            model: self.model.clone(),
        };
        let text = with_timeout(self.timeout, self.transcriber.transcribe(request))
            .await
            .map_err(MentorError::TranscriptionFailed)?;

        Ok(CaptureOutcome::Transcribed(text.trim().to_string()))
    }
}

// --- Playback ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Synthesizing,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationOutcome {
    Finished,
    /// Superseded by a newer narration or stopped explicitly.
    Stopped,
}

struct ActivePlayback {
    id: u64,
    state: PlaybackState,
    cancel: CancellationToken,
}

/// Clears the active slot when a narration ends, unless a newer one owns it.
struct ClearOnDrop<'a> {
    active: &'a Mutex<Option<ActivePlayback>>,
    id: u64,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        let mut active = lock(self.active);
        if active.as_ref().is_some_and(|a| a.id == self.id) {
            *active = None;
        }
    }
}

/// Text → speech → speaker. `idle → synthesizing → playing → idle`, with at
/// most one narration audible at a time.
pub struct PlaybackFlow {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    model: String,
    voice: String,
    timeout: Duration,
    speaking: AtomicBool,
    next_id: AtomicU64,
    active: Mutex<Option<ActivePlayback>>,
    speaker: tokio::sync::Mutex<()>,
}

impl PlaybackFlow {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        settings: &VoiceSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            model: settings.speech_model.clone(),
            voice: settings.voice.clone(),
            timeout,
            speaking: AtomicBool::new(settings.speaking_enabled),
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
            speaker: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.active)
            .as_ref()
            .map(|a| a.state)
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn speaking_enabled(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Turning speaking off silences whatever is playing.
    pub fn set_speaking(&self, enabled: bool) {
        self.speaking.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.stop();
        }
    }

    pub fn toggle_speaking(&self) -> bool {
        let enabled = !self.speaking_enabled();
        self.set_speaking(enabled);
        enabled
    }

    pub fn stop(&self) {
        if let Some(active) = lock(&self.active).take() {
            active.cancel.cancel();
        }
    }

    fn set_state(&self, id: u64, state: PlaybackState) {
        if let Some(active) = lock(&self.active).as_mut().filter(|a| a.id == id) {
            active.state = state;
        }
    }

    /// Speak `text`, cutting off any narration already in progress.
    pub async fn narrate(&self, text: &str) -> Result<NarrationOutcome, MentorError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let previous = lock(&self.active).replace(ActivePlayback {
            id,
            state: PlaybackState::Synthesizing,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!(superseded = previous.id, "Stopping previous narration");
            previous.cancel.cancel();
        }
        let _clear = ClearOnDrop {
            active: &self.active,
            id,
        };

        let request = SpeechRequest {
            text: text.to_string(),
            model: self.model.clone(),
            voice: self.voice.clone(),
        };
        let synthesized = tokio::select! {
            _ = cancel.cancelled() => None,
            result = with_timeout(self.timeout, self.synthesizer.synthesize(request)) => Some(result),
        };
        let Some(result) = synthesized else {
            return Ok(NarrationOutcome::Stopped);
        };
        let clip = result.map_err(MentorError::SynthesisFailed)?;

        // Wait for the superseded narration to let go of the speaker.
        let speaker = tokio::select! {
            _ = cancel.cancelled() => None,
            guard = self.speaker.lock() => Some(guard),
        };
        let Some(_speaker) = speaker else {
            return Ok(NarrationOutcome::Stopped);
        };

        self.set_state(id, PlaybackState::Playing);
        self.sink.play(clip, cancel.clone()).await?;

        Ok(if cancel.is_cancelled() {
            NarrationOutcome::Stopped
        } else {
            NarrationOutcome::Finished
        })
    }

    /// Narrate without waiting. Failures only reach the side-effect sink.
    pub fn narrate_in_background(self: &Arc<Self>, text: impl Into<String>, sink: SideEffectSink) -> JoinHandle<()> {
        let flow = Arc::clone(self);
        let text = text.into();
        tokio::spawn(async move {
            match flow.narrate(&text).await {
                Ok(NarrationOutcome::Finished) => sink.report(SideEffectReport::NarrationFinished),
                Ok(NarrationOutcome::Stopped) => sink.report(SideEffectReport::NarrationStopped),
                Err(e) => sink.report(SideEffectReport::NarrationFailed {
                    error: e.to_string(),
                }),
            }
        })
    }
}
