use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::settings::RoadmapSettings;
use super::side_effects::SideEffectSink;
use super::transcript::TranscriptStore;
use super::voice::PlaybackFlow;
use crate::error::MentorError;
use crate::models::{CareerPath, Conversation, Message, NewCareerPath, RoadmapData};
use crate::providers::{with_timeout, GeneratedImage, ImageGenerator, ImageRequest};

/// File name used when saving a roadmap image without an explicit target.
pub const DEFAULT_ROADMAP_FILE: &str = "career-roadmap.png";

/// Message contents joined by single spaces, cut to `max_chars` characters.
pub fn conversation_context(messages: &[Message], max_chars: usize) -> String {
    let joined = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    match joined.char_indices().nth(max_chars) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}

pub fn build_roadmap_prompt(settings: &RoadmapSettings, conversation: &Conversation) -> String {
    let context = conversation_context(conversation.tail(settings.tail_messages), settings.max_prompt_chars);
    format!("{}{}{}", settings.prompt_prefix, context, settings.prompt_suffix)
}

/// Turns the tail of a conversation into a roadmap image and records it as a
/// career path.
pub struct RoadmapService {
    transcripts: TranscriptStore,
    images: Arc<dyn ImageGenerator>,
    playback: Option<Arc<PlaybackFlow>>,
    side_effects: SideEffectSink,
    settings: RoadmapSettings,
    timeout: Duration,
}

impl RoadmapService {
    pub fn new(
        transcripts: TranscriptStore,
        images: Arc<dyn ImageGenerator>,
        side_effects: SideEffectSink,
        settings: RoadmapSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            transcripts,
            images,
            playback: None,
            side_effects,
            settings,
            timeout,
        }
    }

    /// Announce finished roadmaps through `playback`.
    pub fn with_playback(mut self, playback: Arc<PlaybackFlow>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub async fn generate_roadmap(&self, conversation_id: &str) -> Result<CareerPath, MentorError> {
        let conversation = self.transcripts.get_conversation(conversation_id).await?;
        let prompt = build_roadmap_prompt(&self.settings, &conversation);
        debug!(%conversation_id, prompt_chars = prompt.chars().count(), "Requesting roadmap image");

        let request = ImageRequest {
            prompt,
            model: self.settings.model.clone(),
            size: self.settings.size.clone(),
            quality: self.settings.quality.clone(),
        };
        let image = with_timeout(self.timeout, self.images.generate_image(request))
            .await
            .map_err(MentorError::ImageGenerationFailed)?;

        let path = self
            .transcripts
            .record_career_path(NewCareerPath {
                conversation_id: Some(conversation_id.to_string()),
                title: self.settings.title.clone(),
                description: self.settings.description.clone(),
                roadmap_data: RoadmapData::default(),
                image_url: Some(image.reference()),
                pdf_url: None,
            })
            .await?;
        info!(%conversation_id, career_path_id = %path.id, "Roadmap saved");

        // Confirmation plays whether or not replies are being spoken.
        if let Some(playback) = &self.playback {
            playback.narrate_in_background(self.settings.narration.clone(), self.side_effects.clone());
        }

        Ok(path)
    }

    /// Write the roadmap image of `path` to `dest`. Hosted images are
    /// downloaded first. Returns the number of bytes written.
    pub async fn download_image(&self, path: &CareerPath, dest: &Path) -> Result<usize, MentorError> {
        let reference = path
            .image_url
            .as_deref()
            .ok_or_else(|| MentorError::validation("This roadmap has no image."))?;
        let image = GeneratedImage::from_reference(reference)
            .ok_or_else(|| MentorError::validation("The roadmap image link is not usable."))?;

        let data = match image {
            GeneratedImage::Inline { data, .. } => data,
            GeneratedImage::Url(url) => with_timeout(self.timeout, self.images.fetch_image(&url))
                .await
                .map_err(MentorError::DownloadFailed)?,
        };

        tokio::fs::write(dest, &data).await?;
        info!(career_path_id = %path.id, dest = %dest.display(), bytes = data.len(), "Roadmap image saved");
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::settings::VoiceSettings;
    use crate::services::side_effects::SideEffectReport;
    use crate::testing::{FakeImages, FakeSink, FakeSpeech, ScriptedStore};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn seeded(store: &Arc<ScriptedStore>, contents: &[&str]) -> (TranscriptStore, String) {
        let transcripts = TranscriptStore::new(store.clone());
        let conv = transcripts
            .create_conversation("Roadmap", Message::user(contents[0]))
            .await
            .unwrap();
        let rest: Vec<_> = contents[1..].iter().map(|c| Message::assistant(*c)).collect();
        transcripts.append_messages(&conv.id, &rest).await.unwrap();
        (transcripts, conv.id)
    }

    fn conversation(messages: Vec<Message>) -> Conversation {
        let now = chrono::Utc::now();
        Conversation {
            id: "c1".to_string(),
            title: "Roadmap".to_string(),
            language: "en".to_string(),
            messages,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_prompt_uses_last_five_messages() {
        let settings = RoadmapSettings::default();
        let messages: Vec<_> = (1..=7).map(|i| Message::user(format!("m{}", i))).collect();
        let prompt = build_roadmap_prompt(&settings, &conversation(messages.clone()));
        assert!(prompt.contains("for: m3 m4 m5 m6 m7."));

        let short = build_roadmap_prompt(&settings, &conversation(messages[..2].to_vec()));
        assert!(short.contains("for: m1 m2."));
        assert_eq!(conversation_context(&[], 500), "");
    }

    #[test]
    fn test_context_is_capped_on_char_boundary() {
        let messages = vec![Message::user("ü".repeat(400)), Message::assistant("ß".repeat(400))];
        let context = conversation_context(&messages, 500);
        assert_eq!(context.chars().count(), 500);
        assert!(context.starts_with('ü'));
    }

    #[test]
    fn test_prompt_embeds_context() {
        let settings = RoadmapSettings::default();
        let prompt = build_roadmap_prompt(&settings, &conversation(vec![Message::user("I like data")]));
        assert!(prompt.starts_with("Create a professional career roadmap visualization for: I like data."));
        assert!(prompt.contains("milestones"));
    }

    #[tokio::test]
    async fn test_generates_and_records_career_path() {
        let store = Arc::new(ScriptedStore::new());
        let contents = ["msg1", "msg2", "msg3", "msg4", "msg5", "msg6"];
        let (transcripts, id) = seeded(&store, &contents).await;
        let images = Arc::new(FakeImages::url("https://images.example/roadmap.png"));
        let service = RoadmapService::new(
            transcripts.clone(),
            images.clone(),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        let path = service.generate_roadmap(&id).await.unwrap();
        assert_eq!(path.title, "Career Roadmap");
        assert_eq!(path.description, "AI-generated career path visualization");
        assert_eq!(path.image_url.as_deref(), Some("https://images.example/roadmap.png"));
        assert_eq!(path.conversation_id.as_deref(), Some(id.as_str()));
        assert!(path.roadmap_data.milestones.is_empty());

        let prompts = images.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("msg2 msg3 msg4 msg5 msg6"));
        assert!(!prompts[0].contains("msg1"));
        assert_eq!(transcripts.list_career_paths().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_image_failure_records_nothing() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["I want to design apps"]).await;
        let service = RoadmapService::new(
            transcripts.clone(),
            Arc::new(FakeImages::failing()),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        let err = service.generate_roadmap(&id).await.unwrap_err();
        assert!(matches!(err, MentorError::ImageGenerationFailed(_)));
        assert!(transcripts.list_career_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_distinct() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["hello"]).await;
        let service = RoadmapService::new(
            transcripts,
            Arc::new(FakeImages::url("https://images.example/r.png")),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        store.fail_inserts(true);
        let err = service.generate_roadmap(&id).await.unwrap_err();
        assert!(matches!(err, MentorError::PersistenceFailed(_)));
    }

    #[tokio::test]
    async fn test_narration_failure_does_not_fail_roadmap() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["hello"]).await;
        let playback = Arc::new(PlaybackFlow::new(
            Arc::new(FakeSpeech::failing()),
            Arc::new(FakeSink::finishing()),
            &VoiceSettings::default(),
            TIMEOUT,
        ));
        let (sink, mut reports) = SideEffectSink::channel();
        let service = RoadmapService::new(
            transcripts,
            Arc::new(FakeImages::url("https://images.example/r.png")),
            sink,
            RoadmapSettings::default(),
            TIMEOUT,
        )
        .with_playback(playback);

        assert!(service.generate_roadmap(&id).await.is_ok());
        assert!(matches!(
            reports.recv().await,
            Some(SideEffectReport::NarrationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirmation_narrated_with_speaking_off() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["hello"]).await;
        let speech = Arc::new(FakeSpeech::new());
        let playback = Arc::new(PlaybackFlow::new(
            speech.clone(),
            Arc::new(FakeSink::finishing()),
            &VoiceSettings::default(),
            TIMEOUT,
        ));
        assert!(!playback.speaking_enabled());
        let (sink, mut reports) = SideEffectSink::channel();
        let service = RoadmapService::new(
            transcripts,
            Arc::new(FakeImages::url("https://images.example/r.png")),
            sink,
            RoadmapSettings::default(),
            TIMEOUT,
        )
        .with_playback(playback);

        service.generate_roadmap(&id).await.unwrap();
        assert_eq!(reports.recv().await, Some(SideEffectReport::NarrationFinished));
        assert_eq!(speech.texts(), vec![RoadmapSettings::default().narration]);
    }

    fn temp_file() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("mentor-roadmap-{}.png", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_inline_roadmap_saved_to_file() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["I like data"]).await;
        let images = Arc::new(FakeImages::inline(b"\x89PNG inline"));
        let service = RoadmapService::new(
            transcripts,
            images.clone(),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        let path = service.generate_roadmap(&id).await.unwrap();
        assert!(path.image_url.as_deref().unwrap().starts_with("data:image/png;base64,"));

        let dest = temp_file();
        let written = service.download_image(&path, &dest).await.unwrap();
        let saved = std::fs::read(&dest).unwrap();
        std::fs::remove_file(&dest).unwrap();

        assert_eq!(saved, b"\x89PNG inline");
        assert_eq!(written, saved.len());
        assert!(images.fetches().is_empty());
    }

    #[tokio::test]
    async fn test_hosted_roadmap_is_downloaded() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["I like data"]).await;
        let images = Arc::new(FakeImages::url("https://images.example/roadmap.png"));
        let service = RoadmapService::new(
            transcripts,
            images.clone(),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        let path = service.generate_roadmap(&id).await.unwrap();
        let dest = temp_file();
        service.download_image(&path, &dest).await.unwrap();
        let saved = std::fs::read(&dest).unwrap();
        std::fs::remove_file(&dest).unwrap();

        assert_eq!(saved, images.hosted_bytes().to_vec());
        assert_eq!(images.fetches(), vec!["https://images.example/roadmap.png".to_string()]);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_save_failure() {
        let store = Arc::new(ScriptedStore::new());
        let (transcripts, id) = seeded(&store, &["I like data"]).await;
        let service = RoadmapService::new(
            transcripts,
            Arc::new(FakeImages::inline(b"png")),
            SideEffectSink::logging(),
            RoadmapSettings::default(),
            TIMEOUT,
        );

        let path = service.generate_roadmap(&id).await.unwrap();
        let dest = std::env::temp_dir()
            .join(format!("mentor-missing-{}", uuid::Uuid::new_v4()))
            .join(DEFAULT_ROADMAP_FILE);
        let err = service.download_image(&path, &dest).await.unwrap_err();
        assert!(matches!(err, MentorError::SaveFailed(_)));
    }
}
