//! Commonly used types and traits

pub use crate::async_queue::AsyncStepQueue;
pub use crate::error::QueueError;
pub use crate::execution::ExecutionId;
pub use crate::queue::StepQueue;
pub use crate::step::{RecipeStep, StepName};
pub use crate::storage::{DurableFileStore, FsFileStore, MemoryFileStore};
