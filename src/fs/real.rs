//! The real filesystem view.

use super::{ApplyOutcome, FileSystem, FsKind};
use crate::core::types::FileCommand;
use std::path::{Path, PathBuf};

/// Direct disk access. Last writer wins per path.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

fn ensure_parent(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
        }
    }
    Ok(())
}

impl FileSystem for RealFs {
    fn kind(&self) -> FsKind {
        FsKind::Real
    }

    fn read(&self, path: &Path) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn apply(&self, command: &FileCommand) -> Result<ApplyOutcome, String> {
        match command {
            FileCommand::CreateFile {
                new_path,
                new_content,
            } => {
                ensure_parent(new_path)?;
                std::fs::write(new_path, new_content)
                    .map_err(|e| format!("cannot write {}: {}", new_path.display(), e))?;
            }
            FileCommand::UpdateFile {
                old_path,
                new_content,
            } => {
                if !old_path.is_file() {
                    return Ok(ApplyOutcome::Ignored(format!(
                        "{} no longer exists",
                        old_path.display()
                    )));
                }
                std::fs::write(old_path, new_content)
                    .map_err(|e| format!("cannot write {}: {}", old_path.display(), e))?;
            }
            FileCommand::DeleteFile { old_path } => {
                if !old_path.exists() {
                    return Ok(ApplyOutcome::Ignored(format!(
                        "{} already removed",
                        old_path.display()
                    )));
                }
                std::fs::remove_file(old_path)
                    .map_err(|e| format!("cannot remove {}: {}", old_path.display(), e))?;
            }
            FileCommand::MoveFile { old_path, new_path } => {
                if !old_path.is_file() {
                    return Ok(ApplyOutcome::Ignored(format!(
                        "{} no longer exists",
                        old_path.display()
                    )));
                }
                ensure_parent(new_path)?;
                std::fs::rename(old_path, new_path).map_err(|e| {
                    format!(
                        "cannot move {} to {}: {}",
                        old_path.display(),
                        new_path.display(),
                        e
                    )
                })?;
            }
        }
        Ok(ApplyOutcome::Applied)
    }

    fn list_files(&self) -> Option<Vec<PathBuf>> {
        None
    }
}
