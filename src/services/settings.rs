use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;

const SETTINGS_KEY: &str = "app_settings";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are NextStep.AI, a helpful career mentor. Provide personalized career guidance, suggest learning paths, and help students discover their potential. When discussing career paths, mention specific skills, milestones, and resources.";

pub const DEFAULT_ROADMAP_PREFIX: &str = "Create a professional career roadmap visualization for: ";
pub const DEFAULT_ROADMAP_SUFFIX: &str = ". Show a clear learning path with milestones, skills, and progression steps. Use modern, clean design with icons and visual hierarchy.";
pub const DEFAULT_ROADMAP_NARRATION: &str = "Your personalized career roadmap has been generated. Take a look at the visualization to see your learning path and key milestones.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub chat: ChatSettings,
    pub extraction: ExtractionSettings,
    pub roadmap: RoadmapSettings,
    pub voice: VoiceSettings,
    /// Deadline for each call to an AI endpoint.
    pub request_timeout_secs: u64,
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            chat: ChatSettings::default(),
            extraction: ExtractionSettings::default(),
            roadmap: RoadmapSettings::default(),
            voice: VoiceSettings::default(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub title_max_chars: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            title_max_chars: 50,
        }
    }
}

/// Word lists driving skill extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Skill names recognised verbatim (case-sensitive).
    pub vocabulary: Vec<String>,
    /// A reply must mention one of these (case-insensitive) to be scanned...
    pub trigger_words: Vec<String>,
    /// ...and one of these.
    pub career_keywords: Vec<String>,
    pub max_skills: usize,
    pub category: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            vocabulary: owned(&[
                "React",
                "Python",
                "JavaScript",
                "TypeScript",
                "Machine Learning",
                "Data Analysis",
                "UI Design",
                "SQL",
                "AWS",
                "Docker",
            ]),
            trigger_words: owned(&["career", "roadmap", "path"]),
            career_keywords: owned(&[
                "software",
                "engineer",
                "data scientist",
                "designer",
                "developer",
                "manager",
            ]),
            max_skills: 3,
            category: "Technical".to_string(),
        }
    }
}

impl ExtractionSettings {
    /// Whether an assistant reply talks about careers enough to mine it.
    pub fn should_extract(&self, reply: &str) -> bool {
        let lower = reply.to_lowercase();
        let mentions = |words: &[String]| {
            words
                .iter()
                .any(|w| !w.is_empty() && lower.contains(&w.to_lowercase()))
        };
        mentions(&self.trigger_words) && mentions(&self.career_keywords)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadmapSettings {
    pub model: String,
    pub size: String,
    pub quality: String,
    pub tail_messages: usize,
    pub max_prompt_chars: usize,
    pub prompt_prefix: String,
    pub prompt_suffix: String,
    pub title: String,
    pub description: String,
    pub narration: String,
}

impl Default for RoadmapSettings {
    fn default() -> Self {
        Self {
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            tail_messages: 5,
            max_prompt_chars: 500,
            prompt_prefix: DEFAULT_ROADMAP_PREFIX.to_string(),
            prompt_suffix: DEFAULT_ROADMAP_SUFFIX.to_string(),
            title: "Career Roadmap".to_string(),
            description: "AI-generated career path visualization".to_string(),
            narration: DEFAULT_ROADMAP_NARRATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub speech_model: String,
    pub voice: String,
    pub transcription_model: String,
    pub speaking_enabled: bool,
    /// Program (and arguments) writing recorded audio to stdout.
    pub recorder_command: Vec<String>,
    pub recorder_mime_type: String,
    /// Program (and arguments) playing audio read from stdin.
    pub player_command: Vec<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            transcription_model: "whisper-1".to_string(),
            speaking_enabled: false,
            recorder_command: vec![
                "arecord".to_string(),
                "-q".to_string(),
                "-f".to_string(),
                "cd".to_string(),
                "-t".to_string(),
                "wav".to_string(),
                "-".to_string(),
            ],
            recorder_mime_type: "audio/wav".to_string(),
            player_command: vec![
                "ffplay".to_string(),
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                "-".to_string(),
            ],
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting(SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable settings: {}", e);
                AppSettings::default()
            }),
            Ok(None) => AppSettings::default(),
            Err(e) => {
                tracing::error!("Failed to load settings: {}", e);
                AppSettings::default()
            }
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting(SETTINGS_KEY, &json).await
    }
}
