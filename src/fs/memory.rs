//! In-memory filesystem snapshot for dry runs and recipe composition.
//!
//! The view is seeded once from the real tree (only the matched paths), then
//! mutated in place as each recipe step's commands are applied. Deleted paths
//! are tracked for the rest of the run: later updates or moves that still
//! point at a deleted path are stale and ignored. An explicit create at that
//! path is legitimate and clears the deletion.

use super::{ApplyOutcome, FileSystem, FsKind};
use crate::core::types::FileCommand;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Path to content map.
pub type Snapshot = BTreeMap<PathBuf, String>;

#[derive(Debug, Default)]
struct State {
    files: Snapshot,
    deleted: BTreeSet<PathBuf>,
}

/// Ephemeral file tree. Never shared across unrelated runs.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<State>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        Self {
            state: Mutex::new(State {
                files,
                deleted: BTreeSet::new(),
            }),
        }
    }

    /// Materialize `paths` from `source`. Unreadable paths (binary, vanished)
    /// are left out of the snapshot.
    pub fn seed<I>(source: &dyn FileSystem, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut files = Snapshot::new();
        for path in paths {
            match source.read(&path) {
                Ok(content) => {
                    files.insert(path, content);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable file"),
            }
        }
        debug!(files = files.len(), "seeded virtual snapshot");
        Self::from_files(files)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current path to content map.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().files.clone()
    }

    /// Paths deleted at any point during the run and not re-created.
    pub fn deleted(&self) -> BTreeSet<PathBuf> {
        self.lock().deleted.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileSystem for MemoryFs {
    fn kind(&self) -> FsKind {
        FsKind::Virtual
    }

    fn read(&self, path: &Path) -> Result<String, String> {
        self.lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{} is not in the virtual snapshot", path.display()))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn apply(&self, command: &FileCommand) -> Result<ApplyOutcome, String> {
        let mut state = self.lock();

        if let Some(old) = command.old_path() {
            if state.deleted.contains(old) {
                warn!(path = %old.display(), "ignoring command against deleted path");
                return Ok(ApplyOutcome::Ignored(format!(
                    "{} was deleted earlier in this run",
                    old.display()
                )));
            }
            if !state.files.contains_key(old) {
                return Ok(ApplyOutcome::Ignored(format!(
                    "{} is not in the virtual snapshot",
                    old.display()
                )));
            }
        }

        match command {
            FileCommand::CreateFile {
                new_path,
                new_content,
            } => {
                state.deleted.remove(new_path);
                state.files.insert(new_path.clone(), new_content.clone());
            }
            FileCommand::UpdateFile {
                old_path,
                new_content,
            } => {
                state.files.insert(old_path.clone(), new_content.clone());
            }
            FileCommand::DeleteFile { old_path } => {
                state.files.remove(old_path);
                state.deleted.insert(old_path.clone());
            }
            FileCommand::MoveFile { old_path, new_path } => {
                if let Some(content) = state.files.remove(old_path) {
                    state.deleted.insert(old_path.clone());
                    state.deleted.remove(new_path);
                    state.files.insert(new_path.clone(), content);
                }
            }
        }
        Ok(ApplyOutcome::Applied)
    }

    fn list_files(&self) -> Option<Vec<PathBuf>> {
        Some(self.lock().files.keys().cloned().collect())
    }
}
