pub mod career_path;
pub mod conversation;
pub mod message;
pub mod skill;

pub use career_path::{CareerPath, Milestone, NewCareerPath, RoadmapData};
pub use conversation::Conversation;
pub use message::{Message, Role};
pub use skill::{LearningResource, NewSkill, ProficiencyLevel, Skill};
