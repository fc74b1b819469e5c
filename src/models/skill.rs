use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Beginner => "beginner",
            ProficiencyLevel::Intermediate => "intermediate",
            ProficiencyLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningResource {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub conversation_id: Option<String>,
    pub skill_name: String,
    pub category: String,
    pub proficiency_level: ProficiencyLevel,
    pub resources: Vec<LearningResource>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a skill; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSkill {
    pub conversation_id: Option<String>,
    pub skill_name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub proficiency_level: ProficiencyLevel,
    #[serde(default)]
    pub resources: Vec<LearningResource>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl NewSkill {
    pub fn new(skill_name: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            conversation_id,
            skill_name: skill_name.into(),
            category: default_category(),
            proficiency_level: ProficiencyLevel::default(),
            resources: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = if category.trim().is_empty() {
            default_category()
        } else {
            category
        };
        self
    }

    pub fn with_proficiency(mut self, level: ProficiencyLevel) -> Self {
        self.proficiency_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_category_defaults_to_general() {
        let skill: NewSkill =
            serde_json::from_str(r#"{"conversation_id":null,"skill_name":"SQL"}"#).unwrap();
        assert_eq!(skill.category, "General");
        assert_eq!(skill.proficiency_level, ProficiencyLevel::Beginner);

        let blank = NewSkill::new("SQL", None).with_category("  ");
        assert_eq!(blank.category, "General");
    }
}
