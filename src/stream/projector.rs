//! Projection of upstream response values into text fragments
//!
//! A streamed Gemini response value looks like
//! `{"candidates":[{"content":{"parts":[{"text":"..."}]}}]}`, optionally
//! wrapped in an array of such objects. Every level is optional: safety
//! feedback chunks carry no `parts`, final chunks may carry only usage
//! metadata. Navigation goes through [`Field`], which keeps "absent" and
//! "present with the wrong type" apart instead of collapsing both to null.
//!
//! OpenAI-compatible chat-completions chunks have a different shape,
//! `{"choices":[{"delta":{"content":"..."}}]}`, and are projected through
//! the same accessor when the stream is tagged [`ResponseFormat::ChatCompletion`].

use serde_json::{Map, Value};

use crate::error::{Result, StreamforgeError};

/// A may-be-absent view of one JSON field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// The key is missing, or the parent is not an object
    Absent,
    /// The field holds an object
    Object(&'a Map<String, Value>),
    /// The field holds an array
    Array(&'a [Value]),
    /// The field holds a string
    Text(&'a str),
    /// The field holds a number, boolean or null
    Scalar(&'a Value),
}

impl<'a> Field<'a> {
    /// Classify a value
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Field::Object(map),
            Value::Array(items) => Field::Array(items.as_slice()),
            Value::String(text) => Field::Text(text.as_str()),
            other => Field::Scalar(other),
        }
    }

    /// Look up `key` on an object; anything else yields [`Field::Absent`]
    pub fn get(self, key: &str) -> Field<'a> {
        match self {
            Field::Object(map) => map.get(key).map(Field::of).unwrap_or(Field::Absent),
            _ => Field::Absent,
        }
    }

    /// Array elements, or an empty slice for any other variant
    pub fn items(self) -> &'a [Value] {
        match self {
            Field::Array(items) => items,
            _ => &[],
        }
    }

    /// String content, if this is a string
    pub fn text(self) -> Option<&'a str> {
        match self {
            Field::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Short name of the variant for diagnostics
    pub fn kind(self) -> &'static str {
        match self {
            Field::Absent => "absent",
            Field::Object(_) => "object",
            Field::Array(_) => "array",
            Field::Text(_) => "string",
            Field::Scalar(_) => "scalar",
        }
    }
}

/// Shape of the response values an upstream produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Gemini `GenerateContentResponse` objects, bare or in an array
    #[default]
    Gemini,
    /// OpenAI-compatible `chat.completion.chunk` objects
    ChatCompletion,
}

impl ResponseFormat {
    /// Collect text fragments from one parsed value of this format
    pub fn project_value(self, root: &Value) -> Vec<String> {
        match self {
            ResponseFormat::Gemini => project_value(root),
            ResponseFormat::ChatCompletion => project_chat_completion(root),
        }
    }

    /// Parse one complete JSON value of this format
    ///
    /// # Errors
    ///
    /// Returns [`StreamforgeError::Projection`] when `raw` is not valid JSON.
    pub fn project(self, raw: &str) -> Result<Vec<String>> {
        let root: Value = serde_json::from_str(raw.trim())
            .map_err(|e| StreamforgeError::Projection(format!("invalid JSON: {}", e)))?;
        Ok(self.project_value(&root))
    }
}

/// Parse one complete JSON value and collect its text fragments in order
///
/// # Errors
///
/// Returns [`StreamforgeError::Projection`] when `raw` is not valid JSON.
/// Missing or wrong-typed fields are never errors.
///
/// # Examples
///
/// ```
/// use streamforge::stream::project;
///
/// let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"},{"text":"!"}]}}]}"#;
/// assert_eq!(project(raw).unwrap(), vec!["Hi".to_string(), "!".to_string()]);
/// ```
pub fn project(raw: &str) -> Result<Vec<String>> {
    ResponseFormat::Gemini.project(raw)
}

/// Collect text fragments from an already parsed value
pub fn project_value(root: &Value) -> Vec<String> {
    let mut fragments = Vec::new();
    match Field::of(root) {
        Field::Array(responses) => {
            for response in responses {
                append_candidate_text(Field::of(response), &mut fragments);
            }
        }
        response @ Field::Object(_) => append_candidate_text(response, &mut fragments),
        other => {
            tracing::warn!("JSON root is neither an object nor an array: {}", other.kind());
        }
    }
    fragments
}

fn append_candidate_text(response: Field<'_>, fragments: &mut Vec<String>) {
    let candidates = match response.get("candidates") {
        Field::Array(candidates) => candidates,
        Field::Absent => return,
        other => {
            tracing::warn!("Expected 'candidates' to be an array, got {}", other.kind());
            return;
        }
    };

    for candidate in candidates {
        let parts = Field::of(candidate).get("content").get("parts").items();
        fragments.extend(
            parts
                .iter()
                .filter_map(|part| Field::of(part).get("text").text())
                .map(str::to_owned),
        );
    }
}

/// Collect `choices[].delta.content` fragments from a chat-completions chunk
///
/// An in-stream `error` object carries no text and is logged.
pub fn project_chat_completion(root: &Value) -> Vec<String> {
    let chunk = Field::of(root);
    if let Field::Object(error) = chunk.get("error") {
        tracing::warn!("Chat completion stream reported an error: {:?}", error.get("message"));
        return Vec::new();
    }

    match chunk.get("choices") {
        Field::Array(choices) => choices
            .iter()
            .filter_map(|choice| Field::of(choice).get("delta").get("content").text())
            .map(str::to_owned)
            .collect(),
        Field::Absent => Vec::new(),
        other => {
            tracing::warn!("Expected 'choices' to be an array, got {}", other.kind());
            Vec::new()
        }
    }
}
