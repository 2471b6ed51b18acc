//! On-disk encoding of a single queued step.
//!
//! A record is a JSON object with the string fields `Name` and `FilesPath`
//! and exactly one more string field, keyed by the step name, holding the
//! payload verbatim:
//!
//! ```text
//! {"A":"<A/>","FilesPath":"/a","Name":"A"}
//! ```

use crate::error::{QueueError, Result};
use crate::step::{RecipeStep, StepName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct StepRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "FilesPath")]
    files_path: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

/// Serializes a step into its record text.
pub(crate) fn encode(step: &RecipeStep) -> Result<String> {
    step.validate()?;

    let mut body = Map::new();
    body.insert(
        step.name.as_str().to_string(),
        Value::String(step.payload.clone()),
    );
    let record = StepRecord {
        name: step.name.as_str().to_string(),
        files_path: step.files_path.clone(),
        body,
    };

    serde_json::to_string(&record)
        .map_err(|e| QueueError::InvalidStep(format!("cannot encode step '{}': {e}", step.name)))
}

/// Parses record text read from `path` back into a step.
///
/// Fails with [`QueueError::MalformedRecord`] rather than returning a
/// partially populated step.
pub(crate) fn decode(path: &Path, text: &str) -> Result<RecipeStep> {
    let mut record: StepRecord =
        serde_json::from_str(text).map_err(|e| QueueError::malformed(path, e.to_string()))?;

    if record.name.is_empty() {
        return Err(QueueError::malformed(path, "empty step name"));
    }

    let payload = match record.body.remove(&record.name) {
        Some(Value::String(payload)) => payload,
        Some(other) => {
            return Err(QueueError::malformed(
                path,
                format!(
                    "payload '{}' must be a string, found {}",
                    record.name,
                    json_kind(&other)
                ),
            ))
        }
        None => {
            return Err(QueueError::malformed(
                path,
                format!("missing payload element '{}'", record.name),
            ))
        }
    };

    if let Some(extra) = record.body.keys().next() {
        return Err(QueueError::malformed(
            path,
            format!("unexpected field '{extra}'"),
        ));
    }

    Ok(RecipeStep {
        name: StepName::new(record.name),
        files_path: record.files_path,
        payload,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
