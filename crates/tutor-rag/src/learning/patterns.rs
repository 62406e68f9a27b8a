//! Learned query refinements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageMetadata, Mode};

/// Identity of a refinement: the exact rewrite of one query in one context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefinementKey {
    pub original_query: String,
    pub refined_query: String,
    pub mode: Mode,
    pub subject: Option<String>,
}

impl RefinementKey {
    pub fn new(
        original_query: impl Into<String>,
        refined_query: impl Into<String>,
        mode: Mode,
        subject: Option<String>,
    ) -> Self {
        Self {
            original_query: original_query.into(),
            refined_query: refined_query.into(),
            mode,
            subject,
        }
    }

    /// Key of the refinement that produced an assistant message, if the query was rewritten
    pub fn from_metadata(metadata: &MessageMetadata) -> Option<Self> {
        let refined = metadata.refined_query.as_ref()?;
        let mode = metadata.mode?;
        Some(Self::new(
            metadata.original_query.clone(),
            refined.clone(),
            mode,
            metadata.subject.clone(),
        ))
    }
}

/// A persisted query rewrite and how well it has served users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRecord {
    pub id: Uuid,
    pub original_query: String,
    pub refined_query: String,
    pub mode: Mode,
    pub subject: Option<String>,
    /// Weighted average of feedback scores in [0, 1]; `None` until rated
    pub improvement_score: Option<f32>,
    pub usage_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefinementRecord {
    /// First use of a refinement
    pub fn first_use(key: &RefinementKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_query: key.original_query.clone(),
            refined_query: key.refined_query.clone(),
            mode: key.mode,
            subject: key.subject.clone(),
            improvement_score: None,
            usage_count: 1,
            last_used_at: now,
            created_at: now,
        }
    }

    pub fn key(&self) -> RefinementKey {
        RefinementKey::new(
            self.original_query.clone(),
            self.refined_query.clone(),
            self.mode,
            self.subject.clone(),
        )
    }
}

/// Incremental weighted average: `(old * n + observed) / (n + 1)`.
///
/// An unrated record takes the observed score as is. The result is clamped to [0, 1].
pub fn weighted_average(old: Option<f32>, n: u32, observed: f32) -> f32 {
    let updated = match old {
        Some(old) => (old * n as f32 + observed) / (n as f32 + 1.0),
        None => observed,
    };
    updated.clamp(0.0, 1.0)
}
