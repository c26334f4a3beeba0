//! JSON document conversion for the remote task store.
//!
//! The remote store is a per-user collection of JSON documents whose id
//! equals the task id. Conversion goes through serde, so the document
//! field names are the model's camelCase wire names and unknown enum
//! strings survive the trip (see [`crate::task::Priority`]).

use serde_json::Value;

use crate::task::{Task, TaskId};

/// Document field that carries the task id.
pub const ID_FIELD: &str = "taskId";

/// Error type for document conversion.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document does not deserialize into a task.
    #[error("malformed task document: {0}")]
    Malformed(String),
}

/// Converts a task into its remote document form.
#[must_use]
pub fn to_document(task: &Task) -> Value {
    // Serializing the model cannot fail: every field maps to a JSON type.
    serde_json::to_value(task).unwrap_or(Value::Null)
}

/// Reconstructs a task from a remote document.
///
/// # Errors
///
/// Returns [`DocumentError::Malformed`] if required fields are missing or
/// have the wrong JSON type.
pub fn from_document(doc: Value) -> Result<Task, DocumentError> {
    serde_json::from_value(doc).map_err(|e| DocumentError::Malformed(e.to_string()))
}

/// Overwrites the id field of a stored document in place.
///
/// The remote store assigns ids after the initial write, then patches the
/// stored document so the id is discoverable from the document itself.
pub fn patch_id(doc: &mut Value, id: &TaskId) {
    if let Value::Object(map) = doc {
        map.insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
    }
}

/// Reads the id field of a document, if present.
#[must_use]
pub fn document_id(doc: &Value) -> Option<TaskId> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(TaskId::from_string)
}
