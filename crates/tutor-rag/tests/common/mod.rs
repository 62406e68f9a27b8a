//! Deterministic providers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use tutor_rag::config::RagConfig;
use tutor_rag::error::{Error, Result};
use tutor_rag::providers::{Completer, Completion, Embedder};
use tutor_rag::retrieval::{RetrievedPassage, SearchFilter, VectorIndex};
use tutor_rag::storage::{MemoryStore, RecordStore};
use tutor_rag::types::{Chunk, Document, TokenUsage};
use tutor_rag::Orchestrator;

pub const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each lowercased word bumps one hashed dimension
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(5381u32, |h, b| h.wrapping_mul(33) ^ u32::from(b));
            vector[hash as usize % DIMENSIONS] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Embedder that is always unreachable
pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::retrieval("embedding service unreachable"))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Which workflow step a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Refine,
    Answer,
    Grade,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Self {
        if prompt.starts_with("Rewrite the student's question") {
            Self::Refine
        } else if prompt.starts_with("You are grading an answer") {
            Self::Grade
        } else {
            Self::Answer
        }
    }
}

type Reply = std::result::Result<String, String>;

#[derive(Default)]
struct Script {
    rewrites: VecDeque<Reply>,
    answers: VecDeque<Reply>,
    grades: VecDeque<Reply>,
    prompts: Vec<(PromptKind, String)>,
}

/// Completer replaying scripted replies per prompt kind.
///
/// Each call reports 10 prompt and 5 completion tokens. When a queue runs dry the
/// last default applies: the query echoed back, a generic answer, a 0.9 grade.
#[derive(Default)]
pub struct ScriptedCompleter {
    script: Mutex<Script>,
}

impl ScriptedCompleter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rewrite(&self, reply: &str) -> &Self {
        self.script.lock().rewrites.push_back(Ok(reply.to_string()));
        self
    }

    pub fn answer(&self, reply: &str) -> &Self {
        self.script.lock().answers.push_back(Ok(reply.to_string()));
        self
    }

    pub fn fail_answer(&self, message: &str) -> &Self {
        self.script.lock().answers.push_back(Err(message.to_string()));
        self
    }

    pub fn grade(&self, score: f32) -> &Self {
        self.script.lock().grades.push_back(Ok(format!(
            r#"{{"score": {}, "feedback": "Scored {}", "strengths": [], "improvements": ["be more specific"]}}"#,
            score, score
        )));
        self
    }

    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.script
            .lock()
            .prompts
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<Completion> {
        let kind = PromptKind::of(prompt);
        let reply = {
            let mut script = self.script.lock();
            script.prompts.push((kind, prompt.to_string()));
            match kind {
                PromptKind::Refine => script.rewrites.pop_front(),
                PromptKind::Answer => script.answers.pop_front(),
                PromptKind::Grade => script.grades.pop_front(),
            }
        };

        let reply = reply.unwrap_or_else(|| {
            Ok(match kind {
                PromptKind::Refine => "a more specific version of the question".to_string(),
                PromptKind::Answer => "Here is a grounded explanation of the topic.".to_string(),
                PromptKind::Grade => r#"{"score": 0.9, "feedback": "Good"}"#.to_string(),
            })
        });

        match reply {
            Ok(text) => Ok(Completion {
                text,
                usage: TokenUsage::new(10, 5),
            }),
            Err(message) => Err(Error::generation(message)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Index that returns the same ranked passages for every search
pub struct FixedIndex {
    passages: Vec<RetrievedPassage>,
}

impl FixedIndex {
    /// One passage per `(title, similarity)`, in the given order
    pub fn new(entries: &[(&str, f32)]) -> Arc<Self> {
        let passages = entries
            .iter()
            .enumerate()
            .map(|(i, (title, similarity))| RetrievedPassage {
                chunk_id: Uuid::new_v4(),
                document_id: Uuid::new_v4(),
                title: title.to_string(),
                content: format!("Reference passage {} from {}", i, title),
                chunk_index: 0,
                similarity: *similarity,
                vector_score: *similarity,
                keyword_score: None,
            })
            .collect();
        Arc::new(Self { passages })
    }
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn insert(&self, _document: &Document, _chunks: &[Chunk]) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &[f32], _filter: &SearchFilter, top_k: usize) -> Result<Vec<RetrievedPassage>> {
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }

    async fn keyword_search(&self, _query: &str, _filter: &SearchFilter, _top_k: usize) -> Result<Vec<RetrievedPassage>> {
        Ok(Vec::new())
    }

    async fn update_document(&self, _document: &Document) -> Result<()> {
        Ok(())
    }

    async fn delete_by_document(&self, _document_id: &Uuid) -> Result<usize> {
        Ok(0)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.passages.len())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Everything a workflow test needs to inspect
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub completer: Arc<ScriptedCompleter>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Harness {
    let completer = ScriptedCompleter::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        &RagConfig::default(),
        embedder,
        completer.clone(),
        index,
        store.clone() as Arc<dyn RecordStore>,
    );

    Harness {
        orchestrator,
        completer,
        store,
    }
}
