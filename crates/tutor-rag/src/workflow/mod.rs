//! Self-refining answer workflow

pub mod orchestrator;
pub mod state;

pub use orchestrator::{collect_sources, Orchestrator, StreamUpdate, APOLOGY};
pub use state::{next_state, WorkflowContext, WorkflowState};
