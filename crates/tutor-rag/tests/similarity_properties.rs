use proptest::prelude::*;
use tutor_rag::ingestion::{split_into_sentences, TextChunker};
use tutor_rag::retrieval::cosine_similarity;

fn vector_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..32).prop_flat_map(|len| {
        (
            prop::collection::vec(-100.0f32..100.0, len),
            prop::collection::vec(-100.0f32..100.0, len),
        )
    })
}

fn paragraph() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Z][a-z]{0,10}( [a-z]{1,10}){0,12}\\.", 1..30).prop_map(|s| s.join(" "))
}

proptest! {
    #[test]
    fn cosine_is_bounded((a, b) in vector_pair()) {
        let similarity = cosine_similarity(&a, &b);
        prop_assert!((-1.0..=1.0).contains(&similarity));
    }

    #[test]
    fn cosine_is_symmetric((a, b) in vector_pair()) {
        prop_assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_self_is_one((a, _) in vector_pair()) {
        prop_assume!(a.iter().any(|x| *x != 0.0));
        prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_has_no_similarity((a, _) in vector_pair()) {
        let zero = vec![0.0f32; a.len()];
        prop_assert_eq!(cosine_similarity(&zero, &a), 0.0);
    }

    #[test]
    fn chunks_respect_size_unless_one_sentence(text in paragraph(), size in 40usize..400) {
        let chunker = TextChunker::new(size, size / 4);
        for draft in chunker.chunk(&text, "Notes") {
            let sentences = draft.metadata.sentence_end - draft.metadata.sentence_start;
            prop_assert!(
                draft.content.chars().count() <= size || sentences == 1,
                "chunk of {} sentences is {} chars",
                sentences,
                draft.content.chars().count()
            );
        }
    }

    #[test]
    fn chunks_cover_every_sentence_in_order(text in paragraph(), size in 40usize..400) {
        let chunker = TextChunker::new(size, size / 4);
        let drafts = chunker.chunk(&text, "Notes");
        let total = split_into_sentences(&text).len();

        prop_assert!(!drafts.is_empty());
        prop_assert_eq!(drafts[0].metadata.sentence_start, 0);
        prop_assert_eq!(drafts.last().map(|d| d.metadata.sentence_end), Some(total));

        for (i, pair) in drafts.windows(2).enumerate() {
            let (prev, next) = (&pair[0].metadata, &pair[1].metadata);
            // overlap may repeat sentences but never skips one or stalls
            prop_assert!(next.sentence_start <= prev.sentence_end);
            prop_assert!(next.sentence_end > prev.sentence_end);
            prop_assert_eq!(pair[1].index as usize, i + 1);
        }
    }

    #[test]
    fn chunking_is_deterministic(text in paragraph()) {
        let chunker = TextChunker::new(200, 50);
        prop_assert_eq!(chunker.chunk(&text, "Notes"), chunker.chunk(&text, "Notes"));
    }
}
