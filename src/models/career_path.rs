use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    pub duration: String,
    pub skills: Vec<String>,
}

/// Structured roadmap content. The image-only roadmap flow leaves this empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadmapData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareerPath {
    pub id: String,
    pub conversation_id: Option<String>,
    pub title: String,
    pub description: String,
    pub roadmap_data: RoadmapData,
    pub image_url: Option<String>,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCareerPath {
    pub conversation_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub roadmap_data: RoadmapData,
    pub image_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}
