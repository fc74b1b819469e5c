use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Logical collections the mentor keeps documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Conversations,
    CareerPaths,
    SkillsLearned,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Conversations => "conversations",
            Collection::CareerPaths => "career_paths",
            Collection::SkillsLearned => "skills_learned",
        }
    }
}

/// A stored document: the JSON body plus the metadata the store owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub order_by: SortField,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn newest_created() -> Self {
        Self {
            order_by: SortField::CreatedAt,
            descending: true,
            limit: None,
        }
    }

    pub fn recently_updated(limit: usize) -> Self {
        Self {
            order_by: SortField::UpdatedAt,
            descending: true,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection} '{id}'")]
    NotFound { collection: &'static str, id: String },

    #[error("Version conflict on {collection} '{id}': expected {expected}, found {found}")]
    Conflict {
        collection: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.as_str(),
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed(_))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

/// Whole-document store. There is no partial-field update and no
/// multi-document transaction; `update` may carry the version the caller last
/// read, and the store rejects the write with `StoreError::Conflict` when the
/// document has moved on since.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: Collection, body: Value) -> Result<Document, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError>;

    async fn list(&self, collection: Collection, query: ListQuery) -> Result<Vec<Document>, StoreError>;
}
