pub mod audio;
pub mod chat;
pub mod dashboard;
pub mod database;
pub mod documents;
pub mod export;
pub mod keyring;
pub mod roadmap;
pub mod session;
pub mod settings;
pub mod side_effects;
pub mod skills;
pub mod transcript;
pub mod voice;

pub use audio::{CommandAudioSink, CommandMicrophone};
pub use chat::{ChatOrchestrator, SendOutcome};
pub use database::Database;
pub use keyring::KeyringService;
pub use roadmap::RoadmapService;
pub use session::MentorSession;
pub use settings::{AppSettings, SettingsService};
pub use side_effects::{SideEffectReport, SideEffectSink};
pub use skills::SkillExtractor;
pub use transcript::TranscriptStore;
pub use voice::{CaptureFlow, PlaybackFlow};
