use crate::error::{QueueError, Result};
use std::fmt;

/// Identifier of one logical recipe run.
///
/// Every execution id owns exactly one queue directory, so the id must be
/// usable as a single path segment: it cannot be empty, `.` or `..`, and
/// cannot contain path separators or NUL bytes.
///
/// # Examples
///
/// ```
/// use stepqueue::ExecutionId;
///
/// let id = ExecutionId::new("run-42")?;
/// assert_eq!(id.as_str(), "run-42");
///
/// assert!(ExecutionId::new("../etc").is_err());
/// assert!(ExecutionId::new("").is_err());
/// # Ok::<(), stepqueue::QueueError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Creates a new ExecutionId, rejecting ids that are not a single path segment.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(QueueError::InvalidExecutionId(
                "execution id must not be empty".to_string(),
            ));
        }
        if id == "." || id == ".." {
            return Err(QueueError::InvalidExecutionId(format!(
                "'{id}' is not a valid directory name"
            )));
        }
        if id.contains(['/', '\\', '\0']) {
            return Err(QueueError::InvalidExecutionId(format!(
                "'{}' must not contain path separators",
                id.escape_debug()
            )));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ExecutionId {
    type Error = QueueError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ExecutionId {
    type Error = QueueError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for ExecutionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
