//! Extraction and validation of JSON objects embedded in model output

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Balanced `{...}` spans in `text`, in order of their opening brace.
///
/// Braces inside JSON strings (including escaped quotes) do not count.
pub fn json_object_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut search_from = 0usize;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        match balanced_end(bytes, start) {
            Some(end) => {
                candidates.push(&text[start..=end]);
                search_from = start + 1;
            }
            // Stray opening brace in prose; later objects may still close
            None => search_from = start + 1,
        }
    }

    candidates
}

/// First balanced JSON object in `text`, if any
pub fn extract_json_object(text: &str) -> Option<&str> {
    json_object_candidates(text).into_iter().next()
}

/// Index of the brace closing the object opened at `start`
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the first embedded object in `text` that deserializes as `T`
pub fn parse_structured<T: DeserializeOwned>(text: &str, what: &str) -> Result<T> {
    let candidates = json_object_candidates(text);
    if candidates.is_empty() {
        return Err(Error::parse(what, "no JSON object found in model output"));
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    Err(Error::parse(
        what,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no matching object".to_string()),
    ))
}

/// One multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Quiz or exam produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizPayload {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

impl QuizPayload {
    /// Extract and validate a payload from raw model output
    pub fn from_model_output(text: &str) -> Result<Self> {
        let mut payload: QuizPayload = parse_structured(text, "question payload")?;
        payload.validate()?;
        Ok(payload)
    }

    /// Check the payload shape; letter answers ("B") are normalized to the option text
    pub fn validate(&mut self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::parse("question payload", "title is empty"));
        }
        if self.questions.is_empty() {
            return Err(Error::parse("question payload", "no questions"));
        }

        for (i, question) in self.questions.iter_mut().enumerate() {
            let n = i + 1;
            if question.question.trim().is_empty() {
                return Err(Error::parse("question payload", format!("question {} is empty", n)));
            }
            if question.options.len() < 2 {
                return Err(Error::parse(
                    "question payload",
                    format!("question {} needs at least two options", n),
                ));
            }

            let answer = question.answer.trim();
            if let Some(option) = question
                .options
                .iter()
                .find(|o| o.trim().eq_ignore_ascii_case(answer))
            {
                question.answer = option.clone();
                continue;
            }

            match letter_index(answer).and_then(|idx| question.options.get(idx)) {
                Some(option) => question.answer = option.clone(),
                None => {
                    return Err(Error::parse(
                        "question payload",
                        format!("answer of question {} is not one of its options", n),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// "A" / "b)" / "C." -> option index
fn letter_index(answer: &str) -> Option<usize> {
    let trimmed = answer.trim_end_matches(|c: char| c == ')' || c == '.');
    let mut chars = trimmed.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() || !letter.is_ascii_uppercase() {
        return None;
    }
    Some((letter as u8 - b'A') as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_ignores_braces_in_strings() {
        let text = r#"Sure! {"feedback": "use {x} and \"}\" carefully", "score": 0.8} trailing"#;
        let object = extract_json_object(text).unwrap();
        assert!(object.ends_with("0.8}"));
        let value: serde_json::Value = serde_json::from_str(object).unwrap();
        assert_eq!(value["score"], 0.8);
    }

    #[test]
    fn test_scanner_handles_unbalanced_input() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{\"open\": true").is_none());
    }

    #[test]
    fn test_scanner_skips_stray_open_brace() {
        #[derive(Deserialize)]
        struct Score {
            score: f32,
        }
        let text = r#"The set {1, 2, 3 is listed in the answer. Grade: {"score": 0.8}"#;
        assert_eq!(extract_json_object(text), Some(r#"{"score": 0.8}"#));
        let parsed: Score = parse_structured(text, "evaluation").unwrap();
        assert!((parsed.score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_parse_skips_non_matching_objects() {
        #[derive(Deserialize)]
        struct Score {
            score: f32,
        }
        let text = r#"{"note": "ignore me"} then {"score": 0.4}"#;
        let parsed: Score = parse_structured(text, "evaluation").unwrap();
        assert!((parsed.score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_quiz_payload_validation() {
        let text = r#"```json
{"title": "Cells", "questions": [
  {"question": "Powerhouse of the cell?", "options": ["Nucleus", "Mitochondria"], "answer": "b", "explanation": "ATP"},
  {"question": "Plant cell wall material?", "options": ["Cellulose", "Chitin"], "answer": "cellulose"}
]}
```"#;
        let payload = QuizPayload::from_model_output(text).unwrap();
        assert_eq!(payload.questions[0].answer, "Mitochondria");
        assert_eq!(payload.questions[1].answer, "Cellulose");
    }

    #[test]
    fn test_quiz_payload_rejects_bad_answer() {
        let text = r#"{"title": "T", "questions": [{"question": "Q", "options": ["a", "b"], "answer": "z"}]}"#;
        assert!(matches!(
            QuizPayload::from_model_output(text),
            Err(Error::Parse { .. })
        ));
        assert!(QuizPayload::from_model_output("I could not write a quiz").is_err());
    }
}
