//! Learning from feedback: refinement patterns and their scores

pub mod feedback;
pub mod learner;
pub mod patterns;

pub use feedback::{observed_score, FeedbackKind, FeedbackRecord, FeedbackRequest};
pub use learner::{FeedbackOutcome, RefinementLearner};
pub use patterns::{weighted_average, RefinementKey, RefinementRecord};
