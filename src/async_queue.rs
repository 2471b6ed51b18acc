//! Async facade over [`StepQueue`] for tokio-based executors.

use crate::error::{QueueError, Result};
use crate::execution::ExecutionId;
use crate::index::StepIndex;
use crate::queue::StepQueue;
use crate::step::RecipeStep;
use crate::storage::DurableFileStore;
use std::sync::Arc;
use tokio::task;

/// Runs queue operations on tokio's blocking thread pool.
///
/// Queue operations are plain blocking file I/O; this wrapper keeps them
/// off the async worker threads. Cloning is cheap and shares the queue.
///
/// # Examples
///
/// ```
/// use stepqueue::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), QueueError> {
/// let queue = AsyncStepQueue::new(StepQueue::new(MemoryFileStore::new()));
/// let run = ExecutionId::new("run1")?;
///
/// queue.enqueue(run.clone(), RecipeStep::new("A", "/a", "<A/>")).await?;
/// let step = queue.dequeue(run).await?;
/// assert_eq!(step.map(|s| s.payload), Some("<A/>".to_string()));
/// # Ok(())
/// # }
/// ```
pub struct AsyncStepQueue<S> {
    inner: Arc<StepQueue<S>>,
}

impl<S> Clone for AsyncStepQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for AsyncStepQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStepQueue")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S> AsyncStepQueue<S>
where
    S: DurableFileStore + 'static,
{
    /// Wraps a queue.
    pub fn new(queue: StepQueue<S>) -> Self {
        Self {
            inner: Arc::new(queue),
        }
    }

    /// Returns the wrapped queue for direct blocking use
    pub fn blocking(&self) -> &StepQueue<S> {
        &self.inner
    }

    /// See [`StepQueue::enqueue`].
    pub async fn enqueue(&self, execution_id: ExecutionId, step: RecipeStep) -> Result<StepIndex> {
        let queue = Arc::clone(&self.inner);
        run_blocking(move || queue.enqueue(&execution_id, &step)).await
    }

    /// See [`StepQueue::dequeue`].
    pub async fn dequeue(&self, execution_id: ExecutionId) -> Result<Option<RecipeStep>> {
        let queue = Arc::clone(&self.inner);
        run_blocking(move || queue.dequeue(&execution_id)).await
    }

    /// See [`StepQueue::pending`].
    pub async fn pending(&self, execution_id: ExecutionId) -> Result<usize> {
        let queue = Arc::clone(&self.inner);
        run_blocking(move || queue.pending(&execution_id)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::BackgroundTask(e.to_string()))?
}
