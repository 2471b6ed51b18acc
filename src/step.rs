use crate::error::{QueueError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field names used by the persisted record; a step may not be named after them.
pub(crate) const RESERVED_NAMES: [&str; 2] = ["Name", "FilesPath"];

/// Type-safe step name wrapper.
///
/// The name identifies the handler that will run the step, and doubles as
/// the key the payload is stored under on disk.
///
/// # Examples
///
/// ```
/// use stepqueue::StepName;
///
/// let name = StepName::new("ImportContent");
/// assert_eq!(name.as_str(), "ImportContent");
///
/// // From trait for ergonomic conversion
/// let name: StepName = "Migration".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A unit of deferred recipe work.
///
/// The payload is owned by the caller and never inspected; whatever string
/// is enqueued is what comes back out of [`StepQueue::dequeue`].
///
/// # Examples
///
/// ```
/// use stepqueue::RecipeStep;
///
/// let step = RecipeStep::new("Migration", "Modules/Blog", "<Migration features=\"*\" />");
/// assert_eq!(step.name, "Migration");
/// assert_eq!(step.files_path, "Modules/Blog");
/// ```
///
/// [`StepQueue::dequeue`]: crate::StepQueue::dequeue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStep {
    /// Handler name, also the payload key in the stored record
    pub name: StepName,
    /// Relative path hint owned by the consumer
    pub files_path: String,
    /// Opaque step document
    pub payload: String,
}

impl RecipeStep {
    /// Creates a new step.
    pub fn new(
        name: impl Into<StepName>,
        files_path: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            files_path: files_path.into(),
            payload: payload.into(),
        }
    }

    /// Checks that the step can be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidStep`] if the name is empty or equals
    /// one of the record's field names (`Name`, `FilesPath`).
    pub fn validate(&self) -> Result<()> {
        if self.name.as_str().is_empty() {
            return Err(QueueError::InvalidStep(
                "step name must not be empty".to_string(),
            ));
        }
        if RESERVED_NAMES.contains(&self.name.as_str()) {
            return Err(QueueError::InvalidStep(format!(
                "step name '{}' is reserved",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name() {
        let name = StepName::new("Theme");
        assert_eq!(name.to_string(), "Theme");
        assert_eq!(name, "Theme");
        assert_eq!(StepName::from("Theme".to_string()), name);
    }

    #[test]
    fn test_validate_accepts_regular_step() {
        let step = RecipeStep::new("Feature", "", "<Feature enable=\"Orchard.Blogs\" />");
        assert!(step.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let step = RecipeStep::new("", "/a", "<A/>");
        match step.validate() {
            Err(QueueError::InvalidStep(msg)) => {
                assert_eq!(msg, "step name must not be empty");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_reserved_names() {
        for reserved in RESERVED_NAMES {
            let step = RecipeStep::new(reserved, "/a", "payload");
            assert!(matches!(step.validate(), Err(QueueError::InvalidStep(_))));
        }
    }

    #[test]
    fn test_step_serializes_with_plain_name() {
        let step = RecipeStep::new("A", "/a", "<A/>");
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, r#"{"name":"A","files_path":"/a","payload":"<A/>"}"#);
    }
}
