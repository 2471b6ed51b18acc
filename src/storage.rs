//! File storage primitives the queue is built on.
//!
//! [`DurableFileStore`] is the only thing [`StepQueue`](crate::StepQueue)
//! knows about persistence. Each call is expected to be atomic on its own;
//! nothing here spans more than one file.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{NamedTempFile, PersistError};

/// Name of the directory, under the store root, where writes are staged.
const STAGING_DIR: &str = ".staging";

/// How many times a staged file is moved before a missing parent is fatal.
const PLACE_ATTEMPTS: u32 = 8;

/// Per-file storage operations, with paths relative to the store's root.
///
/// # Examples
///
/// ```
/// use stepqueue::{DurableFileStore, MemoryFileStore};
/// use std::path::Path;
///
/// let store = MemoryFileStore::new();
/// store.create_file(Path::new("q/run1/0"), "record")?;
///
/// assert!(store.directory_exists(Path::new("q/run1"))?);
/// assert_eq!(store.read_file(Path::new("q/run1/0"))?, "record");
/// assert!(!store.create_file_new(Path::new("q/run1/0"), "other")?);
/// # Ok::<(), std::io::Error>(())
/// ```
pub trait DurableFileStore: Send + Sync {
    /// Returns `true` if `path` is an existing directory.
    fn directory_exists(&self, path: &Path) -> io::Result<bool>;

    /// Writes `contents` to `path`, creating parent directories and
    /// replacing any existing file.
    fn create_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Writes `contents` to `path` only if no file exists there yet.
    ///
    /// Returns `Ok(false)`, leaving the existing file untouched, when the
    /// path is already taken.
    fn create_file_new(&self, path: &Path, contents: &str) -> io::Result<bool>;

    /// Reads the whole file at `path`.
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Deletes the file at `path`.
    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Deletes the directory at `path`, which must be empty.
    fn delete_directory(&self, path: &Path) -> io::Result<()>;

    /// Lists the files directly inside the directory at `path`.
    ///
    /// Returned paths include `path` as their prefix. Subdirectories are
    /// not listed.
    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

impl<S: DurableFileStore + ?Sized> DurableFileStore for Arc<S> {
    fn directory_exists(&self, path: &Path) -> io::Result<bool> {
        (**self).directory_exists(path)
    }

    fn create_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        (**self).create_file(path, contents)
    }

    fn create_file_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
        (**self).create_file_new(path, contents)
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        (**self).read_file(path)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        (**self).delete_file(path)
    }

    fn delete_directory(&self, path: &Path) -> io::Result<()> {
        (**self).delete_directory(path)
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        (**self).list_files(path)
    }
}

/// File store rooted at a directory on the local filesystem.
///
/// Writes go to a temporary file under `<root>/.staging` first and are then
/// moved into place, so a reader never sees a partially written record.
#[derive(Debug, Clone)]
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn stage(&self, target: &Path, contents: &str) -> io::Result<NamedTempFile> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let mut staged = NamedTempFile::new_in(&staging)?;
        staged.write_all(contents.as_bytes())?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }
}

/// Moves a staged file to `target`.
///
/// The target's parent can be removed by a concurrent drain between staging
/// and the move; it is recreated and the same staged file is moved again.
fn place<T>(
    target: &Path,
    mut staged: NamedTempFile,
    persist: impl Fn(NamedTempFile, &Path) -> Result<T, PersistError>,
) -> io::Result<T> {
    let mut attempt = 1;
    loop {
        match persist(staged, target) {
            Ok(placed) => return Ok(placed),
            Err(e) if e.error.kind() == io::ErrorKind::NotFound && attempt < PLACE_ATTEMPTS => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                staged = e.file;
                attempt += 1;
            }
            Err(e) => return Err(e.error),
        }
    }
}

impl DurableFileStore for FsFileStore {
    fn directory_exists(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(self.resolve(path)) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let target = self.resolve(path);
        let staged = self.stage(&target, contents)?;
        place(&target, staged, |file, target| file.persist(target))?;
        Ok(())
    }

    fn create_file_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
        let target = self.resolve(path);
        let staged = self.stage(&target, contents)?;
        match place(&target, staged, |file, target| file.persist_noclobber(target)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }

    fn delete_directory(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(self.resolve(path))
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(path.join(entry.file_name()));
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryState {
    fn add_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn is_dir_empty(&self, dir: &Path) -> bool {
        let has_file = self.files.keys().any(|f| f.parent() == Some(dir));
        let has_dir = self.dirs.iter().any(|d| d.parent() == Some(dir));
        !has_file && !has_dir
    }
}

/// Process-local file store, for tests and for callers that do not need
/// the queue to outlive the process.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryFileStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored, across all directories.
    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("'{}' does not exist", path.display()),
    )
}

impl DurableFileStore for MemoryFileStore {
    fn directory_exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.state.read().dirs.contains(path))
    }

    fn create_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state.write();
        if state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is a directory", path.display()),
            ));
        }
        state.add_parents(path);
        state.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_file_new(&self, path: &Path, contents: &str) -> io::Result<bool> {
        let mut state = self.state.write();
        if state.files.contains_key(path) {
            return Ok(false);
        }
        if state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is a directory", path.display()),
            ));
        }
        state.add_parents(path);
        state.files.insert(path.to_path_buf(), contents.to_string());
        Ok(true)
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.state
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.state
            .write()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn delete_directory(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.write();
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        if !state.is_dir_empty(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("directory '{}' is not empty", path.display()),
            ));
        }
        state.dirs.remove(path);
        Ok(())
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.read();
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        Ok(state
            .files
            .keys()
            .filter(|f| f.parent() == Some(path))
            .cloned()
            .collect())
    }
}
