//! Prompt templates for answering, rewriting and evaluating

use crate::learning::RefinementRecord;
use crate::refinement::abbreviations::abbreviations as mode_abbreviations;
use crate::retrieval::RetrievedPassage;
use crate::types::{Message, MessageRole, Mode};

/// Prompt builder for the tutoring workflow
pub struct PromptBuilder;

impl PromptBuilder {
    /// System instructions for a mode
    pub fn system_prompt(mode: Mode) -> &'static str {
        match mode {
            Mode::Research => {
                r#"You are a research assistant for students and teachers. Give accurate, well-organized explanations that build understanding step by step.
Use the reference material when it is relevant and say so when it does not cover the question.
Mention the source titles you relied on. Prefer clear definitions, concrete examples and short summaries over long digressions."#
            }
            Mode::MathSolve => {
                r#"You are a patient mathematics tutor. Solve the problem step by step, stating the rule or theorem used at each step.
Show all intermediate work, keep units and notation consistent and verify the final result.
Finish with a line starting with "Answer:" that states the final result."#
            }
            Mode::PhysicsSolve => {
                r#"You are a physics tutor. Identify the known quantities and the unknown, choose the governing principles and write the equations before substituting values.
Track units through every step and check that the result is physically reasonable.
Finish with a line starting with "Answer:" that states the result with units."#
            }
            Mode::ChemistrySolve => {
                r#"You are a chemistry tutor. Write balanced equations where relevant, identify the concepts involved (stoichiometry, equilibrium, thermodynamics, kinetics) and work through the calculation step by step.
Use correct significant figures and units.
Finish with a line starting with "Answer:" that states the result."#
            }
            Mode::QuizCreate => {
                r#"You are an experienced teacher writing a short classroom quiz. Questions must be clear, unambiguous and appropriate for the requested grade level.
Each question has four options with exactly one correct answer and a one-sentence explanation.
Base the questions on the reference material when it is provided."#
            }
            Mode::ExamCreate => {
                r#"You are an experienced teacher writing an exam. Cover the topic broadly, progress from recall to application and analysis, and keep every question unambiguous.
Each question has four options with exactly one correct answer and an explanation a student can learn from.
Base the questions on the reference material when it is provided."#
            }
        }
    }

    /// Extra output instructions appended after the question
    pub fn instruction_suffix(mode: Mode) -> &'static str {
        match mode {
            Mode::QuizCreate | Mode::ExamCreate => {
                r#"Respond with a single JSON object and nothing else, using exactly this shape:
{"title": "...", "questions": [{"question": "...", "options": ["...", "...", "...", "..."], "answer": "...", "explanation": "..."}]}
The "answer" must be one of the options."#
            }
            Mode::MathSolve | Mode::PhysicsSolve | Mode::ChemistrySolve => {
                "Show your reasoning, then give the final answer."
            }
            Mode::Research => "Answer in clear prose suitable for the student's level.",
        }
    }

    /// Build context from retrieved passages, each labelled with its source and score
    pub fn build_context(passages: &[RetrievedPassage]) -> String {
        let mut context = String::new();

        for (i, passage) in passages.iter().enumerate() {
            context.push_str(&format!(
                "[{}] Source: {} (relevance {:.2})\n{}\n\n---\n\n",
                i + 1,
                passage.title,
                passage.similarity,
                passage.content
            ));
        }

        context
    }

    /// Format the last `exchanges` user/assistant exchanges of a conversation
    pub fn format_history(history: &[Message], exchanges: usize) -> String {
        let turns: Vec<&Message> = history
            .iter()
            .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
            .collect();
        let start = turns.len().saturating_sub(exchanges * 2);

        turns[start..]
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    MessageRole::User => "Student",
                    MessageRole::Assistant | MessageRole::System => "Tutor",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build the answer prompt
    pub fn build_answer_prompt(
        mode: Mode,
        question: &str,
        context: &str,
        history: &str,
        subject: Option<&str>,
        grade_level: Option<&str>,
    ) -> String {
        let mut audience = Vec::new();
        if let Some(subject) = subject {
            audience.push(format!("Subject: {}", subject));
        }
        if let Some(grade) = grade_level {
            audience.push(format!("Grade level: {}", grade));
        }
        let audience = if audience.is_empty() {
            String::new()
        } else {
            format!("{}\n\n", audience.join("\n"))
        };

        let history = if history.is_empty() {
            String::new()
        } else {
            format!("CONVERSATION SO FAR:\n{}\n\n", history)
        };

        let context = if context.is_empty() {
            "No reference material was found for this question. Answer from general knowledge and say that no sources were available.".to_string()
        } else {
            context.to_string()
        };

        format!(
            r#"{system}

{audience}{history}REFERENCE MATERIAL:
{context}

QUESTION: {question}

{suffix}"#,
            system = Self::system_prompt(mode),
            audience = audience,
            history = history,
            context = context,
            question = question,
            suffix = Self::instruction_suffix(mode),
        )
    }

    /// Build the query rewrite prompt
    pub fn build_refine_prompt(
        original: &str,
        mode: Mode,
        subject: Option<&str>,
        grade_level: Option<&str>,
        patterns: &[RefinementRecord],
        feedback_hint: Option<&str>,
    ) -> String {
        let abbreviations = mode_abbreviations(mode)
            .iter()
            .map(|(short, long)| format!("{} = {}", short, long))
            .collect::<Vec<_>>()
            .join(", ");

        let examples = if patterns.is_empty() {
            String::new()
        } else {
            let examples: Vec<String> = patterns
                .iter()
                .map(|p| format!("Original: {}\nImproved: {}", p.original_query, p.refined_query))
                .collect();
            format!(
                "\nREWRITES THAT WORKED WELL BEFORE:\n{}\n",
                examples.join("\n\n")
            )
        };

        let hint = feedback_hint
            .map(|h| format!("\nThe previous answer was judged weak: {}\n", h))
            .unwrap_or_default();

        format!(
            r#"Rewrite the student's question so it retrieves better reference material for a {mode} task.
Expand abbreviations, name the specific concepts involved and add detail appropriate for {grade}{subject}.
Keep the original intent. Do not answer the question.

Known abbreviations: {abbreviations}
{examples}{hint}
ORIGINAL QUESTION: {original}

Respond with only the rewritten question on one line."#,
            mode = mode,
            grade = grade_level
                .map(|g| format!("grade {}", g))
                .unwrap_or_else(|| "the student's level".to_string()),
            subject = subject.map(|s| format!(" in {}", s)).unwrap_or_default(),
            abbreviations = abbreviations,
            examples = examples,
            hint = hint,
            original = original,
        )
    }

    /// Build the answer evaluation prompt
    pub fn build_evaluation_prompt(mode: Mode, question: &str, answer: &str, passages: &[RetrievedPassage]) -> String {
        let sources = if passages.is_empty() {
            "(no reference material was retrieved)".to_string()
        } else {
            passages
                .iter()
                .map(|p| format!("- {} (relevance {:.2})", p.title, p.similarity))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"You are grading an answer produced by a tutoring assistant in {mode} mode.
Judge accuracy, completeness, clarity, educational value, relevance to the question and use of the sources.

QUESTION: {question}

SOURCES USED:
{sources}

ANSWER:
{answer}

Respond with a single JSON object and nothing else:
{{"score": <number between 0 and 1>, "feedback": "<one or two sentences>", "strengths": ["..."], "improvements": ["..."]}}"#,
            mode = mode,
            question = question,
            sources = sources,
            answer = answer,
        )
    }
}
