//! Answer generation: prompts, structured output and the generator

pub mod generator;
pub mod prompt;
pub mod structured;

pub use generator::{confidence, AnswerGenerator, GenerateRequest, GeneratedAnswer};
pub use prompt::PromptBuilder;
pub use structured::{extract_json_object, parse_structured, QuizPayload, QuizQuestion};
