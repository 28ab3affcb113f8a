//! Filesystem views: the real disk and the in-memory snapshot used for dry
//! runs and recipe composition.
//!
//! Both views expose the same read/apply surface so the dispatcher, pool and
//! enumerator never care which one they were handed.

pub mod memory;
pub mod real;

use crate::core::types::FileCommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which kind of view a handle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Real,
    Virtual,
}

/// Result of applying a command to a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The command referenced state the view no longer has.
    Ignored(String),
}

impl ApplyOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// A readable, mutable view of a file tree.
///
/// Methods take `&self`; views that hold state synchronize internally so a
/// handle can be shared between the coordinator and the command sink.
pub trait FileSystem: Send + Sync {
    fn kind(&self) -> FsKind;

    fn read(&self, path: &Path) -> Result<String, String>;

    fn is_file(&self, path: &Path) -> bool;

    fn apply(&self, command: &FileCommand) -> Result<ApplyOutcome, String>;

    /// Every file path in the view. `None` when the view cannot be listed
    /// cheaply and must be walked with glob instead.
    fn list_files(&self) -> Option<Vec<PathBuf>>;
}

/// Read one file without blocking the async runtime. Real views read on
/// the blocking pool; virtual views are in memory and read inline.
pub async fn read_async(fs: &Arc<dyn FileSystem>, path: &Path) -> Result<String, String> {
    if fs.kind() == FsKind::Virtual {
        return fs.read(path);
    }
    let fs = Arc::clone(fs);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || fs.read(&path))
        .await
        .map_err(|e| format!("read task failed: {}", e))?
}

fn read_each(fs: &dyn FileSystem, paths: Vec<PathBuf>) -> Vec<(PathBuf, Result<String, String>)> {
    paths
        .into_iter()
        .map(|path| {
            let content = fs.read(&path);
            (path, content)
        })
        .collect()
}

/// Read many files in one blocking batch, preserving order.
pub async fn read_all(
    fs: &Arc<dyn FileSystem>,
    paths: Vec<PathBuf>,
) -> Result<Vec<(PathBuf, Result<String, String>)>, String> {
    if fs.kind() == FsKind::Virtual {
        return Ok(read_each(fs.as_ref(), paths));
    }
    let fs = Arc::clone(fs);
    tokio::task::spawn_blocking(move || read_each(fs.as_ref(), paths))
        .await
        .map_err(|e| format!("read task failed: {}", e))
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
