use super::transcript::TranscriptStore;
use crate::error::MentorError;
use crate::models::{CareerPath, Conversation, Skill};

pub const RECENT_CONVERSATIONS: usize = 5;

/// Everything the progress view shows.
#[derive(Debug, Clone)]
pub struct DashboardSummary {
    pub recent_conversations: Vec<Conversation>,
    pub career_paths: Vec<CareerPath>,
    pub skills: Vec<Skill>,
}

impl DashboardSummary {
    pub fn conversation_count(&self) -> usize {
        self.recent_conversations.len()
    }

    pub fn career_path_count(&self) -> usize {
        self.career_paths.len()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

/// Load the three dashboard lists concurrently.
pub async fn load_dashboard(transcripts: &TranscriptStore, limit: usize) -> Result<DashboardSummary, MentorError> {
    let (recent_conversations, career_paths, skills) = futures::try_join!(
        transcripts.recent_conversations(limit),
        transcripts.list_career_paths(),
        transcripts.list_skills(),
    )?;

    tracing::debug!(
        conversations = recent_conversations.len(),
        career_paths = career_paths.len(),
        skills = skills.len(),
        "Dashboard loaded"
    );
    Ok(DashboardSummary {
        recent_conversations,
        career_paths,
        skills,
    })
}
