//! Keyword extraction and containment scoring

/// Words shorter than this carry too little signal to match on
const MIN_KEYWORD_LEN: usize = 4;

/// Lowercased words longer than three characters, deduplicated in order of appearance
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
    {
        let word = word.to_lowercase();
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }

    keywords
}

/// Lowercase and collapse whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Keyword relevance of `content` to `query` in [0, 1].
///
/// 1.0 when the whole normalized query appears in the content, otherwise the fraction
/// of query keywords the content contains.
pub fn keyword_score(query: &str, content: &str) -> f32 {
    let query = normalize(query);
    if query.is_empty() {
        return 0.0;
    }

    let content = normalize(content);
    if content.contains(&query) {
        return 1.0;
    }

    let keywords = extract_keywords(&query);
    if keywords.is_empty() {
        return 0.0;
    }

    let hits = keywords.iter().filter(|k| content.contains(k.as_str())).count();
    hits as f32 / keywords.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_filters_short_words() {
        assert_eq!(
            extract_keywords("What is the Speed of light, speed?"),
            vec!["what", "speed", "light"]
        );
    }

    #[test]
    fn test_exact_phrase_scores_one() {
        let content = "Newton's second law: Force equals mass times acceleration.";
        assert_eq!(keyword_score("force  EQUALS mass", content), 1.0);
    }

    #[test]
    fn test_partial_keyword_overlap() {
        let content = "The mitochondria produce energy for the cell.";
        let score = keyword_score("mitochondria energy photosynthesis chloroplast", content);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_keywords() {
        assert_eq!(keyword_score("", "anything"), 0.0);
        assert_eq!(keyword_score("is a of", "nothing matches here"), 0.0);
    }
}
