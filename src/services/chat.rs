use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::settings::ChatSettings;
use super::side_effects::{SideEffectReport, SideEffectSink};
use super::skills::SkillExtractor;
use super::transcript::TranscriptStore;
use crate::error::MentorError;
use crate::models::{Conversation, Message, Role};
use crate::providers::{with_timeout, ChatCompletion, ChatMessage, ChatRequest};

/// Result of one user turn.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub conversation_id: String,
    /// The conversation as last written, ending with the assistant reply.
    pub conversation: Conversation,
    pub message: Message,
}

/// First `max_chars` characters of the opening message.
pub fn derive_title(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Convert `Message` list to `ChatMessage` list for the provider API.
pub fn messages_to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage::new(m.role, m.content.clone()))
        .collect()
}

/// Build a `ChatRequest`: system priming followed by the transcript.
pub fn build_request(settings: &ChatSettings, transcript: &[Message]) -> ChatRequest {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    if !settings.system_prompt.trim().is_empty() {
        messages.push(ChatMessage::new(Role::System, settings.system_prompt.clone()));
    }
    messages.extend(messages_to_chat_messages(transcript));

    ChatRequest {
        model: settings.model.clone(),
        messages,
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
    }
}

/// Runs one user turn: persist the user message, ask the model, persist the
/// reply, and kick off skill extraction when the reply talks careers.
pub struct ChatOrchestrator {
    transcripts: TranscriptStore,
    completion: Arc<dyn ChatCompletion>,
    extractor: Arc<SkillExtractor>,
    side_effects: SideEffectSink,
    settings: ChatSettings,
    timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        transcripts: TranscriptStore,
        completion: Arc<dyn ChatCompletion>,
        extractor: Arc<SkillExtractor>,
        side_effects: SideEffectSink,
        settings: ChatSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            transcripts,
            completion,
            extractor,
            side_effects,
            settings,
            timeout,
        }
    }

    pub async fn send_user_message(
        &self,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<SendOutcome, MentorError> {
        self.send_turn(conversation_id, text, |_| {}).await
    }

    /// Like [`send_user_message`](Self::send_user_message), calling `on_saved`
    /// with the conversation id as soon as the user message is stored, before
    /// the completion is requested.
    pub async fn send_turn<F>(
        &self,
        conversation_id: Option<&str>,
        text: &str,
        on_saved: F,
    ) -> Result<SendOutcome, MentorError>
    where
        F: FnOnce(&str),
    {
        if text.trim().is_empty() {
            return Err(MentorError::validation("Type a message first."));
        }

        let user_message = Message::user(text);
        let conversation = match conversation_id {
            None => {
                let title = derive_title(text, self.settings.title_max_chars);
                self.transcripts.create_conversation(&title, user_message).await?
            }
            Some(id) => {
                let working = self.transcripts.get_conversation(id).await?;
                self.transcripts.append_to(working, &[user_message]).await?
            }
        };
        let conversation_id = conversation.id.clone();
        on_saved(&conversation_id);
        debug!(
            %conversation_id,
            messages = conversation.message_count(),
            "User message saved, requesting completion"
        );

        let request = build_request(&self.settings, &conversation.messages);
        let response = with_timeout(self.timeout, self.completion.complete(request))
            .await
            .map_err(MentorError::CompletionFailed)?;
        info!(
            %conversation_id,
            model = %response.model,
            tokens_in = ?response.tokens_in,
            tokens_out = ?response.tokens_out,
            "Completion received"
        );

        let reply = Message::assistant(response.content);
        let conversation = self
            .transcripts
            .append_messages(&conversation_id, &[reply.clone()])
            .await?;

        if self.extractor.settings().should_extract(&reply.content) {
            self.spawn_extraction(reply.content.clone(), conversation_id.clone());
        }

        Ok(SendOutcome {
            conversation_id,
            conversation,
            message: reply,
        })
    }

    fn spawn_extraction(&self, reply: String, conversation_id: String) {
        let extractor = Arc::clone(&self.extractor);
        let sink = self.side_effects.clone();
        tokio::spawn(async move {
            let report = match extractor.extract_skills(&reply, &conversation_id).await {
                Ok(skills) => SideEffectReport::SkillsExtracted {
                    conversation_id,
                    skills: skills.into_iter().map(|s| s.skill_name).collect(),
                },
                Err(e) => SideEffectReport::ExtractionFailed {
                    conversation_id,
                    error: e.to_string(),
                },
            };
            sink.report(report);
        });
    }
}
