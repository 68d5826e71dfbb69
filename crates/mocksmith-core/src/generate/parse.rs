//! # Response Parser
//!
//! Deserializes the model's `{"data": [...]}` envelope into typed rows and
//! classifies what went wrong when it can't. Syntax and shape errors are
//! `MalformedResponse` (the pipeline asks again); anything else is fatal.
//! Blank text is neither: it means the provider produced nothing.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;

use crate::error::{MockSmithError, Result};

#[derive(Debug, Deserialize)]
#[serde(bound = "K: DeserializeOwned")]
struct Envelope<K> {
    data: Vec<K>,
}

/// What one provider response yielded.
#[derive(Debug)]
pub enum ParseOutcome<K> {
    /// Blank response: request the same sub-batch again.
    Empty,
    Rows(Vec<K>),
}

pub fn parse_rows<K: DeserializeOwned>(raw: &str) -> Result<ParseOutcome<K>> {
    if raw.trim().is_empty() {
        return Ok(ParseOutcome::Empty);
    }

    let json_str = extract_json_object(raw);
    match serde_json::from_str::<Envelope<K>>(json_str) {
        Ok(envelope) => Ok(ParseOutcome::Rows(envelope.data)),
        Err(e) => match e.classify() {
            Category::Syntax | Category::Data | Category::Eof => {
                Err(MockSmithError::MalformedResponse {
                    message: format!("{}. Response: {}", e, truncate(raw, 200)),
                    source: Some(e),
                })
            }
            Category::Io => Err(MockSmithError::ProviderFailure {
                message: format!("Failed to read LLM response: {}", e),
            }),
        },
    }
}

/// Extract the JSON object from a response that may be wrapped in markdown
/// fences or conversational text.
///
/// 1. Markdown code fences (`\`\`\`json ... \`\`\``)
/// 2. The outermost `{ ... }` span
/// 3. Raw trimmed response
fn extract_json_object(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    static OBJECT_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"(?s)\{.*\}").expect("object pattern is a valid regex")
    });

    if let Some(mat) = OBJECT_RE.find(trimmed) {
        return mat.as_str();
    }

    trimmed
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::row::Record;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        id: i64,
        name: String,
    }

    fn rows<K: DeserializeOwned>(raw: &str) -> Vec<K> {
        match parse_rows::<K>(raw).unwrap() {
            ParseOutcome::Rows(rows) => rows,
            ParseOutcome::Empty => panic!("Expected rows"),
        }
    }

    #[test]
    fn test_well_formed_envelope() {
        let parsed: Vec<Pair> = rows(r#"{"data":[{"id":1,"name":"a"}]}"#);
        assert_eq!(
            parsed,
            vec![Pair {
                id: 1,
                name: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = parse_rows::<Pair>("not json").unwrap_err();
        assert!(matches!(err, MockSmithError::MalformedResponse { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_blank_is_empty_not_error() {
        assert!(matches!(
            parse_rows::<Pair>("").unwrap(),
            ParseOutcome::Empty
        ));
        assert!(matches!(
            parse_rows::<Pair>("  \n\t").unwrap(),
            ParseOutcome::Empty
        ));
    }

    #[test]
    fn test_wrong_envelope_is_malformed() {
        let err = parse_rows::<Pair>(r#"{"rows":[{"id":1,"name":"a"}]}"#).unwrap_err();
        assert!(matches!(err, MockSmithError::MalformedResponse { .. }));

        let err = parse_rows::<Pair>(r#"[{"id":1,"name":"a"}]"#).unwrap_err();
        assert!(matches!(err, MockSmithError::MalformedResponse { .. }));
    }

    #[test]
    fn test_row_shape_mismatch_is_malformed() {
        let err = parse_rows::<Pair>(r#"{"data":[{"id":"one","name":"a"}]}"#).unwrap_err();
        assert!(matches!(err, MockSmithError::MalformedResponse { .. }));
    }

    #[test]
    fn test_truncated_json_is_malformed() {
        let err = parse_rows::<Pair>(r#"{"data":[{"id":1,"na"#).unwrap_err();
        assert!(matches!(err, MockSmithError::MalformedResponse { .. }));
    }

    #[test]
    fn test_markdown_fenced_envelope() {
        let response = "Here you go:\n```json\n{\"data\": [{\"id\": 2, \"name\": \"b\"}]}\n```";
        let parsed: Vec<Pair> = rows(response);
        assert_eq!(parsed[0].id, 2);
    }

    #[test]
    fn test_envelope_inside_chatter() {
        let response = "Sure! {\"data\": [{\"id\": 3, \"name\": \"c\"}]} Let me know.";
        let parsed: Vec<Record> = rows(response);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_empty_data_array_is_rows() {
        let parsed: Vec<Pair> = rows(r#"{"data": []}"#);
        assert!(parsed.is_empty());
    }
}
