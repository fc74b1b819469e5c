use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mentor::config::{self, ApiConfig};
use mentor::providers::OpenAiClient;
use mentor::services::dashboard::{load_dashboard, RECENT_CONVERSATIONS};
use mentor::services::export::export_to_markdown;
use mentor::services::keyring::OPENAI_SERVICE;
use mentor::services::roadmap::DEFAULT_ROADMAP_FILE;
use mentor::services::voice::CaptureOutcome;
use mentor::services::{
    AppSettings, CaptureFlow, ChatOrchestrator, CommandAudioSink, CommandMicrophone, Database,
    KeyringService, MentorSession, PlaybackFlow, RoadmapService, SendOutcome, SettingsService,
    SideEffectReport, SideEffectSink, SkillExtractor, TranscriptStore,
};
use mentor::MentorError;

const HELP: &str = "\
Type a message to talk to your mentor, or use a command:
  /new              start a new conversation
  /open <id>        continue an existing conversation
  /record           start or stop voice input (the transcript fills the input)
  /send             send the current input
  /speak            toggle spoken replies
  /roadmap          generate a career roadmap for this conversation
  /roadmap save [f] save the last roadmap image (default career-roadmap.png)
  /dashboard        recent conversations, roadmaps and skills
  /skills           every recorded skill
  /paths            every generated roadmap
  /export [file]    write the conversation as Markdown
  /login <key>      store an API key in the keyring
  /logout           remove the stored API key
  /quit             exit";

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let db = Arc::new(Database::open(&config::database_path()?).await?);
    let settings = SettingsService::load(&db).await;
    let api = ApiConfig::from_env()?;

    let keyring = match KeyringService::new().await {
        Ok(keyring) => Some(keyring),
        Err(e) => {
            warn!("Keyring unavailable: {:#}", e);
            None
        }
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let Some(api_key) = resolve_api_key(&api, keyring.as_ref(), &mut input).await? else {
        return Ok(());
    };

    let client = Arc::new(OpenAiClient::new(api_key, api.base_url.clone(), settings.request_timeout())?);
    let (side_effects, mut reports) = SideEffectSink::channel();
    tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            if let SideEffectReport::SkillsExtracted { skills, .. } = report {
                if !skills.is_empty() {
                    println!("  (skills noted: {})", skills.join(", "));
                }
            }
        }
    });

    let transcripts = TranscriptStore::new(db.clone());
    let session = build_session(&settings, transcripts.clone(), client, side_effects)?;
    let mut repl = Repl {
        session,
        transcripts,
        keyring,
    };

    println!("NextStep mentor. /help lists commands.");
    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match repl.handle(line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("! {:#}", e),
        }
    }

    Ok(())
}

async fn resolve_api_key(
    api: &ApiConfig,
    keyring: Option<&KeyringService>,
    input: &mut Input,
) -> Result<Option<String>> {
    if let Some(key) = &api.api_key {
        return Ok(Some(key.clone()));
    }
    if let Some(keyring) = keyring {
        match keyring.api_key(OPENAI_SERVICE).await {
            Ok(Some(key)) => return Ok(Some(key)),
            Ok(None) => {}
            Err(e) => warn!("Could not read API key from keyring: {:#}", e),
        }
    }

    println!("No API key found. Set OPENAI_API_KEY or enter /login <key> (/quit to exit).");
    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            return Ok(None);
        }
        let Some(key) = line.strip_prefix("/login ").map(str::trim).filter(|k| !k.is_empty()) else {
            println!("Enter /login <key> first.");
            continue;
        };
        if let Some(keyring) = keyring {
            keyring.store_api_key(OPENAI_SERVICE, key).await?;
        }
        return Ok(Some(key.to_string()));
    }
    Ok(None)
}

fn build_session(
    settings: &AppSettings,
    transcripts: TranscriptStore,
    client: Arc<OpenAiClient>,
    side_effects: SideEffectSink,
) -> Result<MentorSession> {
    let timeout = settings.request_timeout();

    let extractor = Arc::new(SkillExtractor::new(transcripts.clone(), settings.extraction.clone())?);
    let orchestrator = Arc::new(ChatOrchestrator::new(
        transcripts.clone(),
        client.clone(),
        extractor,
        side_effects.clone(),
        settings.chat.clone(),
        timeout,
    ));

    let playback = Arc::new(PlaybackFlow::new(
        client.clone(),
        Arc::new(CommandAudioSink::new(settings.voice.player_command.clone())),
        &settings.voice,
        timeout,
    ));
    let capture = Arc::new(CaptureFlow::new(
        Arc::new(CommandMicrophone::new(
            settings.voice.recorder_command.clone(),
            settings.voice.recorder_mime_type.clone(),
        )),
        client.clone(),
        &settings.voice,
        timeout,
    ));
    let roadmaps = Arc::new(
        RoadmapService::new(
            transcripts.clone(),
            client,
            side_effects.clone(),
            settings.roadmap.clone(),
            timeout,
        )
        .with_playback(playback.clone()),
    );

    Ok(MentorSession::new(
        transcripts,
        orchestrator,
        roadmaps,
        capture,
        playback,
        side_effects,
    ))
}

struct Repl {
    session: MentorSession,
    transcripts: TranscriptStore,
    keyring: Option<KeyringService>,
}

impl Repl {
    /// Run one input line. Returns `false` when the user asked to leave.
    async fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => return Ok(false),
            "/help" => println!("{}", HELP),
            "/new" => {
                self.session.start_new_conversation();
                println!("Started a new conversation.");
            }
            "/open" => {
                let conversation = self.session.open_conversation(arg).await?;
                println!("== {} ==", conversation.title);
                for message in &conversation.messages {
                    println!("[{}] {}", message.role.as_str(), message.content);
                }
            }
            "/send" => {
                let outcome = self.session.send_input().await;
                show_reply(outcome);
            }
            "/record" => match self.session.toggle_recording().await {
                Ok(CaptureOutcome::Started) => println!("Recording... /record again to stop."),
                Ok(CaptureOutcome::Transcribed(text)) => {
                    println!("Input: {}  (/send to send it)", text)
                }
                Ok(CaptureOutcome::Stopping) => println!("Stopping once the microphone is ready..."),
                Ok(CaptureOutcome::Busy) => println!("Still transcribing, hold on."),
                Err(e) => notice(&e),
            },
            "/speak" => {
                let enabled = self.session.toggle_speaking();
                println!("Spoken replies {}.", if enabled { "on" } else { "off" });
            }
            "/roadmap" if arg == "save" || arg.starts_with("save ") => {
                let file = arg["save".len()..].trim();
                let file = if file.is_empty() { DEFAULT_ROADMAP_FILE } else { file };
                match self.session.save_roadmap(Path::new(file)).await {
                    Ok(bytes) => println!("Saved roadmap to {} ({} bytes)", file, bytes),
                    Err(e) => notice(&e),
                }
            }
            "/roadmap" => match self.session.generate_roadmap().await {
                Ok(path) => println!(
                    "{}: {}",
                    path.title,
                    path.image_url.as_deref().unwrap_or("(no image)")
                ),
                Err(e) => notice(&e),
            },
            "/dashboard" => {
                let summary = load_dashboard(&self.transcripts, RECENT_CONVERSATIONS).await?;
                println!(
                    "{} recent conversations, {} roadmaps, {} skills",
                    summary.conversation_count(),
                    summary.career_path_count(),
                    summary.skill_count()
                );
                for conversation in &summary.recent_conversations {
                    println!(
                        "  {}  {}  ({} messages)",
                        conversation.id,
                        conversation.title,
                        conversation.message_count()
                    );
                }
            }
            "/skills" => {
                for skill in self.transcripts.list_skills().await? {
                    println!(
                        "  {} [{}] {}",
                        skill.skill_name,
                        skill.category,
                        skill.proficiency_level.as_str()
                    );
                }
            }
            "/paths" => {
                for path in self.transcripts.list_career_paths().await? {
                    println!(
                        "  {}  {}  {}",
                        path.created_at.format("%Y-%m-%d"),
                        path.title,
                        path.image_url.as_deref().unwrap_or("")
                    );
                }
            }
            "/export" => self.export(arg).await?,
            "/login" => {
                let keyring = self
                    .keyring
                    .as_ref()
                    .context("No keyring available on this system")?;
                keyring.store_api_key(OPENAI_SERVICE, arg).await?;
                println!("API key stored; it is used from the next start.");
            }
            "/logout" => {
                let keyring = self
                    .keyring
                    .as_ref()
                    .context("No keyring available on this system")?;
                keyring.forget_api_key(OPENAI_SERVICE).await?;
                println!("API key removed from the keyring.");
            }
            _ if command.starts_with('/') => println!("Unknown command. /help lists commands."),
            _ => {
                let outcome = self.session.send_message(line).await;
                show_reply(outcome);
            }
        }
        Ok(true)
    }

    async fn export(&self, file: &str) -> Result<()> {
        let conversation = self
            .session
            .load_active_conversation()
            .await?
            .context("No active conversation to export")?;
        let markdown = export_to_markdown(&conversation);

        if file.is_empty() {
            println!("{}", markdown);
        } else {
            std::fs::write(Path::new(file), markdown)
                .with_context(|| format!("Failed to write {}", file))?;
            println!("Exported to {}", file);
        }
        Ok(())
    }
}

fn show_reply(outcome: Result<SendOutcome, MentorError>) {
    match outcome {
        Ok(outcome) => println!("mentor> {}", outcome.message.content),
        Err(e) => notice(&e),
    }
}

fn notice(error: &MentorError) {
    warn!("{}", error);
    println!("! {}", error.user_notice());
}
