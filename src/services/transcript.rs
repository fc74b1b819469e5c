use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::documents::{Collection, Document, DocumentStore, ListQuery, StoreError};
use crate::models::conversation::DEFAULT_LANGUAGE;
use crate::models::{CareerPath, Conversation, Message, NewCareerPath, NewSkill, Skill};

/// Times an append is re-applied on a fresh read after losing a version race.
pub const MAX_APPEND_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
struct ConversationBody {
    title: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    messages: Vec<Message>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Typed access to conversations, skills and career paths on top of a
/// whole-document store.
///
/// Transcripts only grow: every write here is "previous messages + new
/// messages", guarded by the version of the snapshot it was built from. When
/// the guard trips, the append is replayed on a fresh read, so two rapid sends
/// both land instead of one silently overwriting the other.
#[derive(Clone)]
pub struct TranscriptStore {
    store: Arc<dyn DocumentStore>,
}

impl TranscriptStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    // --- Conversations ---

    pub async fn create_conversation(&self, title: &str, first: Message) -> Result<Conversation, StoreError> {
        let body = serde_json::to_value(ConversationBody {
            title: title.to_string(),
            language: default_language(),
            messages: vec![first],
        })?;
        let doc = self.store.insert(Collection::Conversations, body).await?;
        debug!(conversation_id = %doc.id, "Created conversation");
        conversation_from_document(doc)
    }

    pub async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        self.store
            .get(Collection::Conversations, id)
            .await?
            .map(conversation_from_document)
            .transpose()
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        self.find_conversation(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Collection::Conversations, id))
    }

    /// Read the conversation now and append `new` to it.
    pub async fn append_messages(&self, id: &str, new: &[Message]) -> Result<Conversation, StoreError> {
        let current = self.get_conversation(id).await?;
        self.append_to(current, new).await
    }

    /// Append `new` to a snapshot the caller already holds.
    pub async fn append_to(&self, snapshot: Conversation, new: &[Message]) -> Result<Conversation, StoreError> {
        let mut current = snapshot;
        let mut attempt = 1;

        loop {
            let mut messages = current.messages.clone();
            messages.extend_from_slice(new);
            let body = serde_json::to_value(ConversationBody {
                title: current.title.clone(),
                language: current.language.clone(),
                messages,
            })?;

            match self
                .store
                .update(Collection::Conversations, &current.id, body, Some(current.version))
                .await
            {
                Ok(doc) => return conversation_from_document(doc),
                Err(e) if e.is_conflict() && attempt < MAX_APPEND_ATTEMPTS => {
                    warn!(
                        conversation_id = %current.id,
                        attempt,
                        "Transcript changed underneath append, replaying on fresh copy"
                    );
                    attempt += 1;
                    current = self.get_conversation(&current.id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn recent_conversations(&self, limit: usize) -> Result<Vec<Conversation>, StoreError> {
        self.store
            .list(Collection::Conversations, ListQuery::recently_updated(limit))
            .await?
            .into_iter()
            .map(conversation_from_document)
            .collect()
    }

    // --- Skills ---

    pub async fn record_skill(&self, skill: NewSkill) -> Result<Skill, StoreError> {
        let doc = self
            .store
            .insert(Collection::SkillsLearned, serde_json::to_value(&skill)?)
            .await?;
        skill_from_document(doc)
    }

    pub async fn list_skills(&self) -> Result<Vec<Skill>, StoreError> {
        self.store
            .list(Collection::SkillsLearned, ListQuery::newest_created())
            .await?
            .into_iter()
            .map(skill_from_document)
            .collect()
    }

    // --- Career paths ---

    pub async fn record_career_path(&self, path: NewCareerPath) -> Result<CareerPath, StoreError> {
        let doc = self
            .store
            .insert(Collection::CareerPaths, serde_json::to_value(&path)?)
            .await?;
        career_path_from_document(doc)
    }

    pub async fn list_career_paths(&self) -> Result<Vec<CareerPath>, StoreError> {
        self.store
            .list(Collection::CareerPaths, ListQuery::newest_created())
            .await?
            .into_iter()
            .map(career_path_from_document)
            .collect()
    }
}

fn conversation_from_document(doc: Document) -> Result<Conversation, StoreError> {
    let body: ConversationBody = serde_json::from_value(doc.body)?;
    Ok(Conversation {
        id: doc.id,
        title: body.title,
        language: body.language,
        messages: body.messages,
        version: doc.version,
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    })
}

fn skill_from_document(doc: Document) -> Result<Skill, StoreError> {
    let body: NewSkill = serde_json::from_value(doc.body)?;
    Ok(Skill {
        id: doc.id,
        conversation_id: body.conversation_id,
        skill_name: body.skill_name,
        category: body.category,
        proficiency_level: body.proficiency_level,
        resources: body.resources,
        created_at: doc.created_at,
    })
}

fn career_path_from_document(doc: Document) -> Result<CareerPath, StoreError> {
    let body: NewCareerPath = serde_json::from_value(doc.body)?;
    Ok(CareerPath {
        id: doc.id,
        conversation_id: body.conversation_id,
        title: body.title,
        description: body.description,
        roadmap_data: body.roadmap_data,
        image_url: body.image_url,
        pdf_url: body.pdf_url,
        created_at: doc.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProficiencyLevel, Role};
    use crate::services::database::Database;
    use crate::testing::ScriptedStore;

    fn transcripts() -> TranscriptStore {
        TranscriptStore::new(Arc::new(Database::new_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_create_and_append() {
        let store = transcripts();
        let conv = store
            .create_conversation("Hello", Message::user("Hello"))
            .await
            .unwrap();
        assert_eq!(conv.title, "Hello");
        assert_eq!(conv.language, "en");
        assert_eq!(conv.message_count(), 1);

        let conv = store
            .append_messages(&conv.id, &[Message::assistant("Hi there")])
            .await
            .unwrap();
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.messages[1].role, Role::Assistant);

        let reread = store.get_conversation(&conv.id).await.unwrap();
        assert_eq!(reread.messages, conv.messages);
        assert_eq!(reread.version, conv.version);
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_lose_messages() {
        let store = transcripts();
        let conv = store
            .create_conversation("Q", Message::user("first"))
            .await
            .unwrap();

        let stale = conv.clone();
        store
            .append_to(conv, &[Message::user("second")])
            .await
            .unwrap();

        // Built from a snapshot that predates "second"
        let merged = store
            .append_to(stale, &[Message::user("third")])
            .await
            .unwrap();

        let contents: Vec<_> = merged.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_append_gives_up_after_repeated_conflicts() {
        let scripted = Arc::new(ScriptedStore::new());
        let store = TranscriptStore::new(scripted.clone());
        let conv = store
            .create_conversation("Q", Message::user("first"))
            .await
            .unwrap();

        scripted.conflict_next_updates(MAX_APPEND_ATTEMPTS);
        let err = store
            .append_messages(&conv.id, &[Message::user("lost")])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(scripted.update_calls(), MAX_APPEND_ATTEMPTS);

        let reread = store.get_conversation(&conv.id).await.unwrap();
        assert_eq!(reread.message_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_conversation() {
        let store = transcripts();
        assert!(store.find_conversation("missing").await.unwrap().is_none());
        let err = store.get_conversation("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_skills_and_career_paths() {
        let store = transcripts();
        let skill = store
            .record_skill(
                NewSkill::new("Docker", Some("c1".to_string()))
                    .with_category("Technical")
                    .with_proficiency(ProficiencyLevel::Intermediate),
            )
            .await
            .unwrap();
        assert_eq!(skill.skill_name, "Docker");
        assert_eq!(skill.proficiency_level, ProficiencyLevel::Intermediate);

        store
            .record_career_path(NewCareerPath {
                conversation_id: Some("c1".to_string()),
                title: "Career Roadmap".to_string(),
                description: String::new(),
                roadmap_data: Default::default(),
                image_url: Some("https://img/1.png".to_string()),
                pdf_url: None,
            })
            .await
            .unwrap();

        assert_eq!(store.list_skills().await.unwrap().len(), 1);
        let paths = store.list_career_paths().await.unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].roadmap_data.milestones.is_empty());
    }
}
