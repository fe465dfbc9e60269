//! Tolerant JSON extraction and deterministic chunking

use serde_json::{Deserializer, Value};

use crate::error::{AiError, Result};

/// Chunk size used when re-emitting a finished payload as a stream.
pub const JSON_CHUNK_SIZE: usize = 128;

/// Parse model output that should be a JSON object but may be wrapped in
/// prose or code fences. Falls back to the first complete `{ ... }` value,
/// ignoring whatever follows it.
pub fn soft_json_parse(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let mut first_error = None;
    for (start, _) in trimmed.match_indices('{') {
        let mut values = Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value @ Value::Object(_))) => return Ok(value),
            Some(Err(e)) if first_error.is_none() => first_error = Some(e),
            _ => {}
        }
    }

    Err(match first_error {
        Some(e) => AiError::InvalidFormat(format!("malformed JSON object: {e}")),
        None => AiError::InvalidFormat("no JSON object found in model output".to_string()),
    })
}

/// Split `payload` into chunks of at most `size` characters.
pub fn iter_json_chunks(payload: &str, size: usize) -> impl Iterator<Item = String> + '_ {
    let size = size.max(1);
    let mut rest = payload;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let cut = rest
            .char_indices()
            .nth(size)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(cut);
        rest = tail;
        Some(head.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        assert_eq!(soft_json_parse(r#" {"a": 1} "#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_object_with_trailing_prose() {
        let text = "{\"a\": {\"b\": 2}}\n\nI hope this helps!";
        assert_eq!(soft_json_parse(text).unwrap(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_braces_in_trailing_prose_are_ignored() {
        let text = "Here you go: {\"answer\": \"yes\"} (see {1} for details})";
        assert_eq!(soft_json_parse(text).unwrap(), json!({"answer": "yes"}));
    }

    #[test]
    fn test_leading_prose_braces_are_skipped() {
        let text = "Using {placeholders} here: {\"ok\": true}";
        assert_eq!(soft_json_parse(text).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_code_fence() {
        let text = "```json\n{\"ok\": true}\n```";
        assert_eq!(soft_json_parse(text).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_no_object() {
        assert!(soft_json_parse("no json here").is_err());
        assert!(soft_json_parse("} backwards {").is_err());
        assert!(soft_json_parse("[1, 2]").is_err());
    }

    #[test]
    fn test_chunks_cover_payload_exactly() {
        let payload = "é".repeat(300);
        let chunks: Vec<String> = iter_json_chunks(&payload, JSON_CHUNK_SIZE).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 128);
        assert_eq!(chunks[2].chars().count(), 44);
        assert_eq!(chunks.concat(), payload);
        assert_eq!(iter_json_chunks("", 128).count(), 0);
    }
}
