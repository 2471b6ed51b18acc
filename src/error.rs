use crate::execution::ExecutionId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while enqueuing or dequeuing steps.
///
/// A missing queue is not an error: [`StepQueue::dequeue`] reports it as
/// `Ok(None)`. Everything here is a failure of the call that produced it,
/// and no variant is retried by the queue itself.
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code. When matching
/// on this error, always include a wildcard pattern:
///
/// ```
/// use stepqueue::QueueError;
///
/// fn report(error: QueueError) {
///     match error {
///         QueueError::Storage { path, source } => {
///             eprintln!("I/O failure at {}: {}", path.display(), source);
///         }
///         QueueError::MalformedRecord { path, details } => {
///             eprintln!("corrupt step {}: {}", path.display(), details);
///         }
///         _ => eprintln!("queue error: {}", error),
///     }
/// }
/// ```
///
/// [`StepQueue::dequeue`]: crate::StepQueue::dequeue
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum QueueError {
    /// The underlying file store failed to create, read, list or delete.
    #[error("Storage failure at '{}': {source}", .path.display())]
    Storage {
        /// Path the failing operation targeted, relative to the store root
        path: PathBuf,
        /// The I/O error reported by the store
        #[source]
        source: std::io::Error,
    },

    /// A step file exists but cannot be decoded into a step.
    #[error("Malformed step record at '{}': {details}", .path.display())]
    MalformedRecord {
        /// Path of the unreadable record
        path: PathBuf,
        /// What was wrong with it
        details: String,
    },

    /// A queue directory contains a file whose name is not a step index.
    #[error("Invalid step index file name: '{}'", .path.display())]
    InvalidIndex {
        /// The offending file
        path: PathBuf,
    },

    /// The step cannot be stored.
    ///
    /// Returned for an empty name, or a name that collides with one of the
    /// record's own field names.
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// The execution id cannot be used as a queue directory name.
    #[error("Invalid execution id: {0}")]
    InvalidExecutionId(String),

    /// Every index allocation attempt collided with a concurrent producer.
    #[error("Could not allocate a step index for execution '{execution_id}' after {attempts} attempts")]
    IndexContention {
        /// The contended queue
        execution_id: ExecutionId,
        /// How many creates were tried
        attempts: u32,
    },

    /// The queue configuration is invalid.
    #[error("Invalid queue configuration: {0}")]
    Configuration(String),

    /// A blocking queue operation could not be joined.
    ///
    /// Only produced by [`AsyncStepQueue`](crate::AsyncStepQueue), when the
    /// blocking task panicked or the runtime shut down underneath it.
    #[error("Background queue task failed: {0}")]
    BackgroundTask(String),
}

impl QueueError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QueueError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        QueueError::MalformedRecord {
            path: path.into(),
            details: details.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = QueueError::malformed("RecipeQueue/run1/0", "missing field `Name`");
        assert_eq!(
            error.to_string(),
            "Malformed step record at 'RecipeQueue/run1/0': missing field `Name`"
        );

        let error = QueueError::InvalidIndex {
            path: PathBuf::from("RecipeQueue/run1/notes.txt"),
        };
        assert_eq!(
            error.to_string(),
            "Invalid step index file name: 'RecipeQueue/run1/notes.txt'"
        );
    }

    #[test]
    fn test_contention_display() {
        let error = QueueError::IndexContention {
            execution_id: ExecutionId::new("run1").unwrap(),
            attempts: 4,
        };
        assert_eq!(
            error.to_string(),
            "Could not allocate a step index for execution 'run1' after 4 attempts"
        );
    }

    #[test]
    fn test_storage_error_keeps_source() {
        use std::error::Error as _;

        let error = QueueError::storage(
            "RecipeQueue/run1/3",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(error.to_string().starts_with("Storage failure at 'RecipeQueue/run1/3'"));
        assert_eq!(error.source().map(|s| s.to_string()), Some("read-only".to_string()));
    }
}
