use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::execution::ExecutionId;
use crate::index::{self, StepIndex};
use crate::record;
use crate::step::RecipeStep;
use crate::storage::DurableFileStore;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable FIFO queue of recipe steps, one queue per execution id.
///
/// Each pending step is one file named by its index inside
/// `<queue_folder>/<execution_id>/`. All state lives in the store, so a
/// queue written by one process can be drained by another after a restart.
///
/// # Examples
///
/// ```
/// use stepqueue::prelude::*;
///
/// let queue = StepQueue::new(MemoryFileStore::new());
/// let run = ExecutionId::new("run1")?;
///
/// queue.enqueue(&run, &RecipeStep::new("A", "/a", "<A/>"))?;
/// queue.enqueue(&run, &RecipeStep::new("B", "/b", "<B/>"))?;
///
/// assert_eq!(queue.dequeue(&run)?.map(|s| s.payload), Some("<A/>".to_string()));
/// assert_eq!(queue.dequeue(&run)?.map(|s| s.payload), Some("<B/>".to_string()));
/// assert_eq!(queue.dequeue(&run)?, None);
/// # Ok::<(), QueueError>(())
/// ```
pub struct StepQueue<S> {
    store: S,
    config: QueueConfig,
}

impl<S> fmt::Debug for StepQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepQueue")
            .field("queue_folder", &self.config.queue_folder)
            .field("collision_retry", &self.config.collision_retry)
            .finish()
    }
}

impl<S: DurableFileStore> StepQueue<S> {
    /// Creates a queue over `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: QueueConfig::default(),
        }
    }

    /// Creates a queue over `store` with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if the queue folder would
    /// escape the store root.
    pub fn with_config(store: S, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Returns the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the active configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Directory holding the steps of `execution_id`, relative to the store root.
    pub fn queue_dir(&self, execution_id: &ExecutionId) -> PathBuf {
        self.config.queue_folder.join(execution_id.as_str())
    }

    /// Appends `step` to the queue of `execution_id` and returns its index.
    ///
    /// The index is one past the largest index currently queued, or `0` for
    /// a queue that does not exist yet. The record is written with an
    /// exclusive create, so a concurrent producer that computed the same
    /// index can never overwrite it; the loser rescans and retries
    /// according to [`QueueConfig::collision_retry`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidStep`] if the step name is empty or reserved
    /// - [`QueueError::InvalidIndex`] if the queue directory holds a file
    ///   that is not a step
    /// - [`QueueError::IndexContention`] if every allocation attempt collided
    /// - [`QueueError::Storage`] if the store fails
    pub fn enqueue(&self, execution_id: &ExecutionId, step: &RecipeStep) -> Result<StepIndex> {
        info!(
            "Enqueuing step '{}' for execution {}",
            step.name, execution_id
        );
        let contents = record::encode(step)?;
        let dir = self.queue_dir(execution_id);
        let policy = &self.config.collision_retry;
        let max_retries = policy.max_retries();

        for attempt in 0..=max_retries {
            let index = match self.scan(&dir)? {
                Some(files) => index::next_index(&files)?,
                None => StepIndex::FIRST,
            };
            let path = dir.join(index.file_name());

            let created = self
                .store
                .create_file_new(&path, &contents)
                .map_err(|e| QueueError::storage(&path, e))?;
            if created {
                debug!(
                    "Stored step '{}' at index {} for execution {}",
                    step.name, index, execution_id
                );
                return Ok(index);
            }

            if attempt < max_retries {
                warn!(
                    "Index {} for execution {} already taken, retrying ({}/{})",
                    index,
                    execution_id,
                    attempt + 1,
                    max_retries
                );
                if let Some(delay) = policy.delay_for_attempt(attempt) {
                    std::thread::sleep(delay);
                }
            }
        }

        warn!(
            "Giving up on step '{}' for execution {} after {} attempts",
            step.name,
            execution_id,
            max_retries.saturating_add(1)
        );
        Err(QueueError::IndexContention {
            execution_id: execution_id.clone(),
            attempts: max_retries.saturating_add(1),
        })
    }

    /// Removes and returns the oldest step of `execution_id`.
    ///
    /// Returns `Ok(None)` when the queue does not exist. When the returned
    /// step was the last one, the queue directory is removed as well; a
    /// directory that is found empty (left behind by an interrupted
    /// dequeue) is removed and reported as `Ok(None)`.
    ///
    /// A record that cannot be decoded is left in place and reported as
    /// [`QueueError::MalformedRecord`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::MalformedRecord`] if the oldest record is corrupt
    /// - [`QueueError::InvalidIndex`] if the queue directory holds a file
    ///   that is not a step
    /// - [`QueueError::Storage`] if the store fails
    pub fn dequeue(&self, execution_id: &ExecutionId) -> Result<Option<RecipeStep>> {
        info!("Dequeuing steps for execution {}", execution_id);
        let dir = self.queue_dir(execution_id);
        let Some(files) = self.scan(&dir)? else {
            return Ok(None);
        };

        let Some(first) = index::first_index(&files)? else {
            debug!("Removing empty queue for execution {}", execution_id);
            return match self.store.delete_directory(&dir) {
                Ok(()) => Ok(None),
                Err(e) => self.recover_from_cleanup(&dir, execution_id, e),
            };
        };

        self.take(&dir, execution_id, first, files.len())
    }

    /// Handles a failed removal of a queue directory found empty.
    ///
    /// A producer may have refilled the directory in between, or it may
    /// already be gone. Only a directory that is still there and still
    /// empty is an error.
    fn recover_from_cleanup(
        &self,
        dir: &Path,
        execution_id: &ExecutionId,
        error: io::Error,
    ) -> Result<Option<RecipeStep>> {
        let Some(files) = self.scan(dir)? else {
            return Ok(None);
        };
        match index::first_index(&files)? {
            Some(first) => {
                debug!(
                    "Queue for execution {} refilled during cleanup",
                    execution_id
                );
                self.take(dir, execution_id, first, files.len())
            }
            None => Err(QueueError::storage(dir, error)),
        }
    }

    /// Reads, decodes and deletes the step at `first`.
    fn take(
        &self,
        dir: &Path,
        execution_id: &ExecutionId,
        first: StepIndex,
        queued: usize,
    ) -> Result<Option<RecipeStep>> {
        let path = dir.join(first.file_name());
        let text = self
            .store
            .read_file(&path)
            .map_err(|e| QueueError::storage(&path, e))?;
        let step = record::decode(&path, &text)?;
        info!(
            "Dequeuing step '{}' for execution {}",
            step.name, execution_id
        );
        self.store
            .delete_file(&path)
            .map_err(|e| QueueError::storage(&path, e))?;

        if queued == 1 {
            self.remove_if_drained(dir, execution_id);
        }

        Ok(Some(step))
    }

    /// Number of steps currently queued for `execution_id`.
    pub fn pending(&self, execution_id: &ExecutionId) -> Result<usize> {
        Ok(self
            .scan(&self.queue_dir(execution_id))?
            .map_or(0, |files| files.len()))
    }

    /// Lists the queue directory, or `None` if it does not exist.
    fn scan(&self, dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        let exists = self
            .store
            .directory_exists(dir)
            .map_err(|e| QueueError::storage(dir, e))?;
        if !exists {
            return Ok(None);
        }
        match self.store.list_files(dir) {
            Ok(files) => Ok(Some(files)),
            // removed by a concurrent dequeue between the two calls
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QueueError::storage(dir, e)),
        }
    }

    /// Deletes the queue directory once the last step is gone.
    ///
    /// The step has already been consumed at this point, so failures are
    /// logged instead of returned; the next dequeue retries the cleanup.
    fn remove_if_drained(&self, dir: &Path, execution_id: &ExecutionId) {
        match self.store.list_files(dir) {
            Ok(files) if files.is_empty() => {
                if let Err(e) = self.store.delete_directory(dir) {
                    warn!(
                        "Could not remove drained queue for execution {}: {}",
                        execution_id, e
                    );
                } else {
                    debug!("Removed drained queue for execution {}", execution_id);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Could not list drained queue for execution {}: {}",
                execution_id, e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::storage::MemoryFileStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn run(id: &str) -> ExecutionId {
        ExecutionId::new(id).unwrap()
    }

    fn queue() -> StepQueue<MemoryFileStore> {
        StepQueue::new(MemoryFileStore::new())
    }

    #[test]
    fn test_fifo_order() {
        let queue = queue();
        let id = run("run1");
        let steps: Vec<_> = (0..12)
            .map(|i| RecipeStep::new(format!("Step{i}"), format!("/p/{i}"), format!("<Step{i}/>")))
            .collect();

        for (i, step) in steps.iter().enumerate() {
            let index = queue.enqueue(&id, step).unwrap();
            assert_eq!(index.value(), i as u64);
        }
        assert_eq!(queue.pending(&id).unwrap(), 12);

        for step in &steps {
            assert_eq!(queue.dequeue(&id).unwrap().as_ref(), Some(step));
        }
        assert_eq!(queue.dequeue(&id).unwrap(), None);
    }

    #[test]
    fn test_partial_drain_keeps_order() {
        let queue = queue();
        let id = run("run1");
        queue.enqueue(&id, &RecipeStep::new("a", "", "a")).unwrap();
        queue.enqueue(&id, &RecipeStep::new("b", "", "b")).unwrap();

        assert_eq!(queue.dequeue(&id).unwrap().map(|s| s.payload), Some("a".into()));
        let index = queue.enqueue(&id, &RecipeStep::new("c", "", "c")).unwrap();
        assert_eq!(index.value(), 2);

        assert_eq!(queue.dequeue(&id).unwrap().map(|s| s.payload), Some("b".into()));
        assert_eq!(queue.dequeue(&id).unwrap().map(|s| s.payload), Some("c".into()));
        assert_eq!(queue.dequeue(&id).unwrap(), None);
    }

    #[test]
    fn test_dequeue_unknown_queue_touches_nothing() {
        let queue = queue();
        let before = queue.store().file_count();
        assert_eq!(queue.dequeue(&run("never")).unwrap(), None);
        assert_eq!(queue.store().file_count(), before);
        assert!(!queue
            .store()
            .directory_exists(Path::new("RecipeQueue/never"))
            .unwrap());
    }

    #[test]
    fn test_directory_removed_after_last_step() {
        let queue = queue();
        let id = run("run1");
        let dir = queue.queue_dir(&id);
        queue.enqueue(&id, &RecipeStep::new("A", "/a", "<A/>")).unwrap();
        assert!(queue.store().directory_exists(&dir).unwrap());

        assert!(queue.dequeue(&id).unwrap().is_some());
        assert!(!queue.store().directory_exists(&dir).unwrap());
        assert_eq!(queue.dequeue(&id).unwrap(), None);
    }

    #[test]
    fn test_empty_leftover_directory_is_removed() {
        let queue = queue();
        let id = run("run1");
        let dir = queue.queue_dir(&id);
        queue
            .store()
            .create_file(&dir.join("0"), "placeholder")
            .unwrap();
        queue.store().delete_file(&dir.join("0")).unwrap();
        assert!(queue.store().directory_exists(&dir).unwrap());

        assert_eq!(queue.dequeue(&id).unwrap(), None);
        assert!(!queue.store().directory_exists(&dir).unwrap());
    }

    #[test]
    fn test_independent_queues() {
        let queue = queue();
        let x = run("x");
        let y = run("y");
        queue.enqueue(&x, &RecipeStep::new("X1", "", "x1")).unwrap();
        queue.enqueue(&y, &RecipeStep::new("Y1", "", "y1")).unwrap();
        queue.enqueue(&x, &RecipeStep::new("X2", "", "x2")).unwrap();

        assert_eq!(queue.dequeue(&y).unwrap().map(|s| s.payload), Some("y1".into()));
        assert_eq!(queue.dequeue(&y).unwrap(), None);
        assert_eq!(queue.pending(&x).unwrap(), 2);
        assert_eq!(queue.dequeue(&x).unwrap().map(|s| s.payload), Some("x1".into()));
        assert_eq!(queue.dequeue(&x).unwrap().map(|s| s.payload), Some("x2".into()));
    }

    #[test]
    fn test_malformed_record_is_kept() {
        let queue = queue();
        let id = run("run1");
        let path = queue.queue_dir(&id).join("0");
        queue.store().create_file(&path, "not a record").unwrap();

        assert!(matches!(
            queue.dequeue(&id),
            Err(QueueError::MalformedRecord { .. })
        ));
        assert_eq!(queue.store().read_file(&path).unwrap(), "not a record");
    }

    #[test]
    fn test_foreign_file_is_invalid_index() {
        let queue = queue();
        let id = run("run1");
        queue.enqueue(&id, &RecipeStep::new("A", "", "")).unwrap();
        queue
            .store()
            .create_file(&queue.queue_dir(&id).join("notes.txt"), "")
            .unwrap();

        assert!(matches!(
            queue.enqueue(&id, &RecipeStep::new("B", "", "")),
            Err(QueueError::InvalidIndex { .. })
        ));
        assert!(matches!(
            queue.dequeue(&id),
            Err(QueueError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_invalid_step_writes_nothing() {
        let queue = queue();
        let id = run("run1");
        assert!(matches!(
            queue.enqueue(&id, &RecipeStep::new("", "", "")),
            Err(QueueError::InvalidStep(_))
        ));
        assert_eq!(queue.pending(&id).unwrap(), 0);
        assert_eq!(queue.store().file_count(), 0);
    }

    #[test]
    fn test_custom_queue_folder() {
        let config = QueueConfig {
            queue_folder: PathBuf::from("jobs/pending"),
            ..QueueConfig::default()
        };
        let queue = StepQueue::with_config(MemoryFileStore::new(), config).unwrap();
        let id = run("run1");
        queue.enqueue(&id, &RecipeStep::new("A", "", "")).unwrap();
        assert!(queue
            .store()
            .read_file(Path::new("jobs/pending/run1/0"))
            .is_ok());
    }

    /// Reports every exclusive create as a collision.
    struct AlwaysTaken {
        inner: MemoryFileStore,
        attempts: Arc<AtomicU32>,
    }

    impl DurableFileStore for AlwaysTaken {
        fn directory_exists(&self, path: &Path) -> io::Result<bool> {
            self.inner.directory_exists(path)
        }
        fn create_file(&self, path: &Path, contents: &str) -> io::Result<()> {
            self.inner.create_file(path, contents)
        }
        fn create_file_new(&self, _path: &Path, _contents: &str) -> io::Result<bool> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
        fn read_file(&self, path: &Path) -> io::Result<String> {
            self.inner.read_file(path)
        }
        fn delete_file(&self, path: &Path) -> io::Result<()> {
            self.inner.delete_file(path)
        }
        fn delete_directory(&self, path: &Path) -> io::Result<()> {
            self.inner.delete_directory(path)
        }
        fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.inner.list_files(path)
        }
    }

    /// Store whose first directory removal races a producer: a step lands
    /// just before the removal is attempted.
    struct RefillOnCleanup {
        inner: MemoryFileStore,
        late_step: parking_lot::Mutex<Option<RecipeStep>>,
    }

    impl DurableFileStore for RefillOnCleanup {
        fn directory_exists(&self, path: &Path) -> io::Result<bool> {
            self.inner.directory_exists(path)
        }
        fn create_file(&self, path: &Path, contents: &str) -> io::Result<()> {
            self.inner.create_file(path, contents)
        }
        fn create_file_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
            self.inner.create_file_new(path, contents)
        }
        fn read_file(&self, path: &Path) -> io::Result<String> {
            self.inner.read_file(path)
        }
        fn delete_file(&self, path: &Path) -> io::Result<()> {
            self.inner.delete_file(path)
        }
        fn delete_directory(&self, path: &Path) -> io::Result<()> {
            if let Some(step) = self.late_step.lock().take() {
                let contents = record::encode(&step).unwrap();
                self.inner.create_file_new(&path.join("0"), &contents)?;
            }
            self.inner.delete_directory(path)
        }
        fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.inner.list_files(path)
        }
    }

    #[test]
    fn test_queue_refilled_during_cleanup_returns_new_step() {
        let late_step = RecipeStep::new("Late", "", "<Late/>");
        let store = RefillOnCleanup {
            inner: MemoryFileStore::new(),
            late_step: parking_lot::Mutex::new(Some(late_step.clone())),
        };
        store
            .inner
            .create_file(Path::new("RecipeQueue/run1/keep"), "")
            .unwrap();
        store
            .inner
            .delete_file(Path::new("RecipeQueue/run1/keep"))
            .unwrap();
        let queue = StepQueue::new(store);

        assert_eq!(queue.dequeue(&run("run1")).unwrap(), Some(late_step));
        assert!(!queue
            .store()
            .directory_exists(Path::new("RecipeQueue/run1"))
            .unwrap());
    }

    #[test]
    fn test_contention_exhausts_retry_policy() {
        let attempts = Arc::new(AtomicU32::new(0));
        let store = AlwaysTaken {
            inner: MemoryFileStore::new(),
            attempts: Arc::clone(&attempts),
        };
        let config = QueueConfig {
            collision_retry: RetryPolicy::fixed(3, Duration::from_millis(0)),
            ..QueueConfig::default()
        };
        let queue = StepQueue::with_config(store, config).unwrap();

        match queue.enqueue(&run("run1"), &RecipeStep::new("A", "", "")) {
            Err(QueueError::IndexContention {
                execution_id,
                attempts: reported,
            }) => {
                assert_eq!(execution_id.as_str(), "run1");
                assert_eq!(reported, 4);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
