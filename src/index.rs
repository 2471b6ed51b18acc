//! Step indices and the directory scans that find them.
//!
//! A queue normally holds a handful of steps, so both scans walk the whole
//! listing instead of maintaining a separate index file.

use crate::error::{QueueError, Result};
use std::fmt;
use std::path::Path;

/// Position of a step within its queue, encoded as the step's file name.
///
/// Indices are allocated in increasing order and never reused while the
/// queue holds steps, so the smallest surviving index is the oldest step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepIndex(u64);

impl StepIndex {
    /// Index of the first step written to a fresh queue.
    pub const FIRST: StepIndex = StepIndex(0);

    /// Creates an index from its numeric value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value
    pub fn value(self) -> u64 {
        self.0
    }

    /// Returns the index following this one.
    pub(crate) fn next(self) -> Result<Self> {
        self.0.checked_add(1).map(StepIndex).ok_or_else(|| {
            QueueError::InvalidIndex {
                path: self.file_name().into(),
            }
        })
    }

    /// Returns the file name this index is stored under.
    pub fn file_name(self) -> String {
        self.0.to_string()
    }

    /// Parses the trailing segment of `path` as an index.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidIndex`] for anything that is not a plain
    /// decimal number.
    pub fn from_path(path: &Path) -> Result<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|name| name.parse::<u64>().ok())
            .map(StepIndex)
            .ok_or_else(|| QueueError::InvalidIndex {
                path: path.to_path_buf(),
            })
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Smallest index in a directory listing, or `None` for an empty listing.
pub(crate) fn first_index<P: AsRef<Path>>(files: &[P]) -> Result<Option<StepIndex>> {
    let mut first = None;
    for file in files {
        let index = StepIndex::from_path(file.as_ref())?;
        if first.map_or(true, |current| index < current) {
            first = Some(index);
        }
    }
    Ok(first)
}

/// Largest index in a directory listing, or `None` for an empty listing.
pub(crate) fn last_index<P: AsRef<Path>>(files: &[P]) -> Result<Option<StepIndex>> {
    let mut last = None;
    for file in files {
        let index = StepIndex::from_path(file.as_ref())?;
        if last.map_or(true, |current| index > current) {
            last = Some(index);
        }
    }
    Ok(last)
}

/// Index the next enqueued step should use.
pub(crate) fn next_index<P: AsRef<Path>>(files: &[P]) -> Result<StepIndex> {
    match last_index(files)? {
        Some(last) => last.next(),
        None => Ok(StepIndex::FIRST),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn listing(names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| Path::new("RecipeQueue").join("run1").join(n))
            .collect()
    }

    #[test]
    fn test_from_path_uses_trailing_segment() {
        let index = StepIndex::from_path(Path::new("RecipeQueue/run1/12")).unwrap();
        assert_eq!(index, StepIndex::new(12));
        assert_eq!(index.file_name(), "12");
    }

    #[test]
    fn test_from_path_rejects_non_numeric() {
        for name in ["abc", "-1", "+3", "1.5", " 7", ".tmp"] {
            let result = StepIndex::from_path(&Path::new("q").join(name));
            assert!(
                matches!(result, Err(QueueError::InvalidIndex { .. })),
                "{name:?} should not parse"
            );
        }
    }

    #[test]
    fn test_leading_zeros_parse() {
        let index = StepIndex::from_path(Path::new("q/007")).unwrap();
        assert_eq!(index.value(), 7);
    }

    #[test]
    fn test_first_and_last_are_numeric_not_lexical() {
        let files = listing(&["10", "9", "2"]);
        assert_eq!(first_index(&files).unwrap(), Some(StepIndex::new(2)));
        assert_eq!(last_index(&files).unwrap(), Some(StepIndex::new(10)));
        assert_eq!(next_index(&files).unwrap(), StepIndex::new(11));
    }

    #[test]
    fn test_empty_listing() {
        let files: Vec<PathBuf> = Vec::new();
        assert_eq!(first_index(&files).unwrap(), None);
        assert_eq!(last_index(&files).unwrap(), None);
        assert_eq!(next_index(&files).unwrap(), StepIndex::FIRST);
    }

    #[test]
    fn test_scan_fails_on_foreign_file() {
        let files = listing(&["0", "README"]);
        assert!(matches!(
            last_index(&files),
            Err(QueueError::InvalidIndex { .. })
        ));
        assert!(matches!(
            first_index(&files),
            Err(QueueError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_next_index_overflow() {
        let max = u64::MAX.to_string();
        let files = listing(&[max.as_str()]);
        assert!(next_index(&files).is_err());
    }
}
