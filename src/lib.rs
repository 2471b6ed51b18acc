//! # stepqueue
//!
//! A durable, filesystem-backed FIFO queue of recipe steps.
//!
//! Every execution gets its own queue directory. Each pending step is one
//! file in that directory, named by a monotonically increasing index, so the
//! queue survives process restarts and needs no database or broker.
//!
//! ## Features
//!
//! - **Durable**: all queue state lives on disk; nothing is cached in memory
//! - **Strict FIFO**: steps come back in enqueue order, even after partial draining
//! - **Self-cleaning**: a drained queue leaves no directory behind
//! - **Safe allocation**: exclusive creates with configurable retry, never overwrites
//! - **Pluggable storage**: [`FsFileStore`] for disk, [`MemoryFileStore`] for tests
//! - **Async facade**: [`AsyncStepQueue`] for tokio-based executors
//!
//! ## Quick Start
//!
//! ```rust
//! use stepqueue::prelude::*;
//!
//! # fn main() -> Result<(), QueueError> {
//! # let dir = tempfile::tempdir().map_err(|e| QueueError::Configuration(e.to_string()))?;
//! # let app_data = dir.path();
//! let queue = StepQueue::new(FsFileStore::new(app_data));
//! let run = ExecutionId::new("run1")?;
//!
//! queue.enqueue(&run, &RecipeStep::new("A", "/a", "<A/>"))?;
//! queue.enqueue(&run, &RecipeStep::new("B", "/b", "<B/>"))?;
//!
//! assert_eq!(queue.dequeue(&run)?.map(|s| s.name), Some("A".into()));
//! assert_eq!(queue.dequeue(&run)?.map(|s| s.name), Some("B".into()));
//! assert_eq!(queue.dequeue(&run)?, None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Surviving a Restart
//!
//! A queue is nothing but files, so a fresh [`StepQueue`] over the same
//! root picks up where the previous one stopped:
//!
//! ```rust
//! use stepqueue::prelude::*;
//!
//! # fn main() -> Result<(), QueueError> {
//! # let dir = tempfile::tempdir().map_err(|e| QueueError::Configuration(e.to_string()))?;
//! let run = ExecutionId::new("setup")?;
//! {
//!     let producer = StepQueue::new(FsFileStore::new(dir.path()));
//!     producer.enqueue(&run, &RecipeStep::new("Feature", "", "<Feature />"))?;
//! }
//!
//! let consumer = StepQueue::new(FsFileStore::new(dir.path()));
//! assert_eq!(consumer.pending(&run)?, 1);
//! assert!(consumer.dequeue(&run)?.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use stepqueue::prelude::*;
//!
//! # let queue = StepQueue::new(MemoryFileStore::new());
//! # let run = ExecutionId::new("run1").unwrap();
//! match queue.dequeue(&run) {
//!     Ok(Some(step)) => println!("running {}", step.name),
//!     Ok(None) => println!("nothing left for {}", run),
//!     Err(QueueError::MalformedRecord { path, details }) => {
//!         eprintln!("corrupt step at {}: {}", path.display(), details);
//!     }
//!     Err(error) => eprintln!("Error: {}", error),
//! }
//! ```

mod async_queue;
mod config;
mod error;
mod execution;
mod index;
mod queue;
mod record;
mod step;
mod storage;

pub mod prelude;

pub use async_queue::AsyncStepQueue;
pub use config::{QueueConfig, RetryPolicy, DEFAULT_QUEUE_FOLDER};
pub use error::{QueueError, Result};
pub use execution::ExecutionId;
pub use index::StepIndex;
pub use queue::StepQueue;
pub use step::{RecipeStep, StepName};
pub use storage::{DurableFileStore, FsFileStore, MemoryFileStore};
