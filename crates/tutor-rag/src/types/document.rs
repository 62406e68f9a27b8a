//! Document and chunk types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::UserRole;

/// Who may retrieve a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to every role
    #[default]
    Public,
    /// Visible to the owner and admins
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }

    /// Check whether a caller may see a document with this visibility.
    ///
    /// Students only see public documents. Teachers additionally see their own
    /// private uploads, admins see everything.
    pub fn is_visible_to(&self, owner_id: &str, role: UserRole, user_id: &str) -> bool {
        match (self, role) {
            (Self::Public, _) => true,
            (Self::Private, UserRole::Admin) => true,
            (Self::Private, UserRole::Teacher) => owner_id == user_id,
            (Self::Private, UserRole::Student) => false,
        }
    }
}

/// Caller-supplied metadata for a document being ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub owner_id: String,
}

/// An ingested reference document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    pub title: String,
    pub subject: Option<String>,
    pub grade_level: Option<String>,
    pub visibility: Visibility,
    pub owner_id: String,
    /// Length of the cleaned text in characters
    pub text_length: usize,
    /// Number of chunks created at ingestion
    pub chunk_count: u32,
    /// SHA-256 of the cleaned text
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record from ingestion metadata
    pub fn new(meta: DocumentMeta, text_length: usize, content_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: meta.title,
            subject: meta.subject,
            grade_level: meta.grade_level,
            visibility: meta.visibility,
            owner_id: meta.owner_id,
            text_length,
            chunk_count: 0,
            content_hash,
            created_at: Utc::now(),
        }
    }

    /// Apply a metadata edit; content-derived fields are immutable
    pub fn apply_update(&mut self, update: &DocumentUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(subject) = &update.subject {
            self.subject = Some(subject.clone());
        }
        if let Some(grade) = &update.grade_level {
            self.grade_level = Some(grade.clone());
        }
        if let Some(visibility) = update.visibility {
            self.visibility = visibility;
        }
    }
}

/// Editable document metadata; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// Listing filter for documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(subject) = &self.subject {
            if doc.subject.as_deref() != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(grade) = &self.grade_level {
            if doc.grade_level.as_deref() != Some(grade.as_str()) {
                return false;
            }
        }
        if let Some(visibility) = self.visibility {
            if doc.visibility != visibility {
                return false;
            }
        }
        if let Some(owner) = &self.owner_id {
            if &doc.owner_id != owner {
                return false;
            }
        }
        true
    }
}

/// Position and provenance of a chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Title of the parent document
    pub source_title: String,
    /// Index of the first sentence in the chunk
    pub sentence_start: usize,
    /// Index one past the last sentence in the chunk
    pub sentence_end: usize,
}

/// A passage of a document with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Ordinal position within the document
    pub chunk_index: u32,
    /// Text content
    pub content: String,
    /// Embedding vector
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk without an embedding
    pub fn new(document_id: Uuid, chunk_index: u32, content: String, metadata: ChunkMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content,
            embedding: Vec::new(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_rules() {
        assert!(Visibility::Public.is_visible_to("t1", UserRole::Student, "s1"));
        assert!(!Visibility::Private.is_visible_to("t1", UserRole::Student, "t1"));
        assert!(Visibility::Private.is_visible_to("t1", UserRole::Teacher, "t1"));
        assert!(!Visibility::Private.is_visible_to("t1", UserRole::Teacher, "t2"));
        assert!(Visibility::Private.is_visible_to("t1", UserRole::Admin, "a1"));
    }

    #[test]
    fn test_update_keeps_content_fields() {
        let mut doc = Document::new(
            DocumentMeta {
                title: "Cells".into(),
                subject: Some("biology".into()),
                grade_level: None,
                visibility: Visibility::Private,
                owner_id: "t1".into(),
            },
            120,
            "abc".into(),
        );
        doc.apply_update(&DocumentUpdate {
            title: Some("Cell Biology".into()),
            visibility: Some(Visibility::Public),
            ..Default::default()
        });

        assert_eq!(doc.title, "Cell Biology");
        assert_eq!(doc.visibility, Visibility::Public);
        assert_eq!(doc.subject.as_deref(), Some("biology"));
        assert_eq!(doc.text_length, 120);
    }
}
