//! Sentence-respecting text chunking with sentence overlap

use unicode_segmentation::UnicodeSegmentation;

use crate::types::ChunkMetadata;

/// A chunk produced by the chunker, before it is attached to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub index: u32,
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Character budget for sentences carried into the next chunk
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split text into ordered chunks.
    ///
    /// Sentences are accumulated until the next one would push the chunk past
    /// `chunk_size`. The next chunk is then seeded with the trailing sentences of the
    /// previous one that fit in the overlap budget. A sentence longer than
    /// `chunk_size` becomes its own chunk; sentences are never split.
    pub fn chunk(&self, text: &str, title: &str) -> Vec<ChunkDraft> {
        let sentences = split_into_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let lengths: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();
        let mut drafts = Vec::new();

        // Sentence indices of the chunk being built
        let mut current: Vec<usize> = Vec::new();
        let mut current_len = 0usize;
        // First sentence index not carried over as overlap
        let mut fresh_from = 0usize;
        let mut i = 0usize;

        while i < sentences.len() {
            let sentence_len = lengths[i];
            let has_fresh = current.iter().any(|&idx| idx >= fresh_from);

            if !current.is_empty() && joined_len(current_len, sentence_len) > self.chunk_size {
                if has_fresh {
                    drafts.push(self.build_draft(&sentences, &current, title, drafts.len()));

                    current = self.overlap_seed(&current, &lengths);
                    current_len = seq_len(&current, &lengths);
                    fresh_from = i;
                    continue;
                }

                // Only overlap left and it does not leave room; shed it from the front
                while !current.is_empty() && joined_len(current_len, sentence_len) > self.chunk_size {
                    current.remove(0);
                    current_len = seq_len(&current, &lengths);
                }
            }

            current_len = if current.is_empty() {
                sentence_len
            } else {
                joined_len(current_len, sentence_len)
            };
            current.push(i);
            i += 1;
        }

        if current.iter().any(|&idx| idx >= fresh_from) {
            drafts.push(self.build_draft(&sentences, &current, title, drafts.len()));
        }

        drafts
    }

    /// Trailing sentences of a chunk that fit in the overlap budget.
    /// Never returns the whole chunk, so every emitted chunk advances.
    fn overlap_seed(&self, chunk: &[usize], lengths: &[usize]) -> Vec<usize> {
        let mut seed = Vec::new();
        let mut total = 0usize;

        for &idx in chunk.iter().rev() {
            if seed.len() + 1 >= chunk.len() {
                break;
            }
            let next = if seed.is_empty() {
                lengths[idx]
            } else {
                joined_len(total, lengths[idx])
            };
            if next > self.overlap {
                break;
            }
            total = next;
            seed.push(idx);
        }

        seed.reverse();
        seed
    }

    fn build_draft(&self, sentences: &[&str], indices: &[usize], title: &str, index: usize) -> ChunkDraft {
        let content = indices
            .iter()
            .map(|&idx| sentences[idx])
            .collect::<Vec<_>>()
            .join(" ");

        ChunkDraft {
            content,
            metadata: ChunkMetadata {
                source_title: title.to_string(),
                sentence_start: indices.first().copied().unwrap_or(0),
                sentence_end: indices.last().map(|idx| idx + 1).unwrap_or(0),
            },
            index: index as u32,
        }
    }
}

/// Split text into trimmed, non-empty sentences
pub fn split_into_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize raw document text before chunking.
///
/// Control characters are dropped and whitespace runs collapse to one space.
pub fn clean_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = !cleaned.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space {
            cleaned.push(' ');
            pending_space = false;
        }
        cleaned.push(c);
    }

    cleaned
}

fn joined_len(current: usize, next: usize) -> usize {
    current + 1 + next
}

fn seq_len(indices: &[usize], lengths: &[usize]) -> usize {
    if indices.is_empty() {
        return 0;
    }
    indices.iter().map(|&idx| lengths[idx]).sum::<usize>() + indices.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Photosynthesis converts light into chemical energy. \
        It happens in the chloroplasts of plant cells. \
        Chlorophyll absorbs mostly blue and red light. \
        The Calvin cycle fixes carbon dioxide into sugars. \
        Oxygen is released as a by-product of splitting water.";

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(100, 20);
        assert!(chunker.chunk("", "Empty").is_empty());
        assert!(chunker.chunk("   \n\t ", "Blank").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::new(1000, 100);
        let chunks = chunker.chunk(TEXT, "Biology");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].metadata.sentence_start, 0);
        assert_eq!(chunks[0].metadata.sentence_end, 5);
        assert_eq!(chunks[0].metadata.source_title, "Biology");
    }

    #[test]
    fn test_chunks_respect_size_and_share_overlap() {
        let chunker = TextChunker::new(110, 60);
        let chunks = chunker.chunk(TEXT, "Biology");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 110, "{}", chunk.content);
        }
        for pair in chunks.windows(2) {
            // Next chunk starts at or before the previous chunk's last sentence
            assert!(pair[1].metadata.sentence_start < pair[0].metadata.sentence_end);
            assert!(pair[1].metadata.sentence_end > pair[0].metadata.sentence_end);
        }
        assert_eq!(chunks.last().unwrap().metadata.sentence_end, 5);
    }

    #[test]
    fn test_oversized_sentence_is_kept_whole() {
        let long = "a".repeat(300);
        let text = format!("Short intro. {}. Short outro.", long);
        let chunker = TextChunker::new(100, 20);
        let chunks = chunker.chunk(&text, "Doc");

        let oversized: Vec<_> = chunks
            .iter()
            .filter(|c| c.content.chars().count() > 100)
            .collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].metadata.sentence_end - oversized[0].metadata.sentence_start, 1);
        assert!(oversized[0].content.contains(&long));
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let chunker = TextChunker::new(90, 40);
        assert_eq!(chunker.chunk(TEXT, "Bio"), chunker.chunk(TEXT, "Bio"));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Hello,\r\n\n  world!\u{0007}  "), "Hello, world!");
        assert_eq!(clean_text(""), "");
    }
}
