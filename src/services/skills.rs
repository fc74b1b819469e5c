use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use super::settings::ExtractionSettings;
use super::transcript::TranscriptStore;
use crate::error::MentorError;
use crate::models::{NewSkill, ProficiencyLevel, Skill};

/// Runs of capitalized words ("Machine Learning"), one space apart.
const CANDIDATE_PATTERN: &str = r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)*\b";

/// Pulls skill mentions out of assistant replies.
///
/// Deliberately precision-biased: only capitalized phrases that exactly match
/// a vocabulary entry count. Anything lower-cased, mis-capitalized or outside
/// the vocabulary is missed.
pub struct SkillExtractor {
    transcripts: TranscriptStore,
    settings: ExtractionSettings,
    vocabulary: HashSet<String>,
    pattern: Regex,
}

impl SkillExtractor {
    pub fn new(transcripts: TranscriptStore, settings: ExtractionSettings) -> Result<Self, MentorError> {
        let pattern = Regex::new(CANDIDATE_PATTERN)
            .map_err(|e| MentorError::Config(format!("Bad skill pattern: {}", e)))?;
        let vocabulary = settings.vocabulary.iter().cloned().collect();
        Ok(Self {
            transcripts,
            settings,
            vocabulary,
            pattern,
        })
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Distinct capitalized phrases in order of first appearance.
    pub fn candidate_phrases<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|phrase| seen.insert(*phrase))
            .collect()
    }

    /// Vocabulary skills mentioned in `text`, capped at `max_skills`.
    pub fn find_skills(&self, text: &str) -> Vec<String> {
        self.candidate_phrases(text)
            .into_iter()
            .filter(|phrase| self.vocabulary.contains(*phrase))
            .take(self.settings.max_skills)
            .map(str::to_string)
            .collect()
    }

    /// Record every skill found in `text` against the conversation, one write
    /// per skill. Stops at the first failed write.
    pub async fn extract_skills(&self, text: &str, conversation_id: &str) -> Result<Vec<Skill>, MentorError> {
        let names = self.find_skills(text);
        debug!(%conversation_id, ?names, "Skills found in reply");

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            let skill = NewSkill::new(name, Some(conversation_id.to_string()))
                .with_category(self.settings.category.clone())
                .with_proficiency(ProficiencyLevel::Beginner);
            created.push(self.transcripts.record_skill(skill).await?);
        }
        Ok(created)
    }
}
