//! Feedback types for learning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Type of feedback
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// Answer was helpful
    Approve,
    /// Answer was not helpful
    Reject,
    /// User supplied a corrected answer
    Correction,
    /// Numeric rating, either in [0, 1] or on a 1-5 scale
    Rating,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Correction => "correction",
            Self::Rating => "rating",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "correction" => Some(Self::Correction),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }
}

/// Feedback request from user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Assistant message the feedback is about
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default)]
    pub user_id: String,
    pub kind: FeedbackKind,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub correction: Option<String>,
}

impl FeedbackRequest {
    /// Score in [0, 1] this feedback contributes to the refinement average
    pub fn observed_score(&self) -> Result<f32> {
        observed_score(self.kind, self.rating)
    }
}

/// Stored feedback record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: String,
    pub kind: FeedbackKind,
    pub rating: Option<f32>,
    pub correction: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FeedbackRequest> for FeedbackRecord {
    fn from(request: FeedbackRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: request.message_id,
            conversation_id: request.conversation_id,
            user_id: request.user_id,
            kind: request.kind,
            rating: request.rating,
            correction: request.correction,
            created_at: Utc::now(),
        }
    }
}

/// Map feedback to an observed score.
///
/// Ratings within [0, 1] are taken as is; ratings in (1, 5] are read as stars.
pub fn observed_score(kind: FeedbackKind, rating: Option<f32>) -> Result<f32> {
    match kind {
        FeedbackKind::Approve => Ok(1.0),
        FeedbackKind::Reject => Ok(0.0),
        FeedbackKind::Correction => Ok(0.25),
        FeedbackKind::Rating => {
            let rating = rating
                .ok_or_else(|| Error::InvalidInput("rating feedback requires a rating".into()))?;
            if !rating.is_finite() {
                return Err(Error::InvalidInput("rating must be a number".into()));
            }
            if (0.0..=1.0).contains(&rating) {
                Ok(rating)
            } else if rating > 1.0 && rating <= 5.0 {
                Ok(rating / 5.0)
            } else {
                Err(Error::InvalidInput(format!(
                    "rating {} is outside [0, 1] and the 1-5 scale",
                    rating
                )))
            }
        }
    }
}
