//! Normalize raw engine output into file commands.

use super::types::FileCommand;
use crate::engines::formatter::ContentFormatter;
use crate::engines::TreeEdit;
use crate::fs::FileSystem;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Command for one per-file transform result. Unchanged output yields none.
pub fn from_file_output(path: &Path, old: &str, new: Option<String>) -> Option<FileCommand> {
    match new {
        Some(content) if content != old => Some(FileCommand::UpdateFile {
            old_path: path.to_path_buf(),
            new_content: content,
        }),
        _ => None,
    }
}

/// Commands for a whole-tree pass, checked against `fs`.
///
/// Edits are interpreted in order, so a batch may create a file and then
/// move it. Edits whose source path does not exist are dropped.
pub fn from_tree_edits(edits: Vec<TreeEdit>, root: &Path, fs: &dyn FileSystem) -> Vec<FileCommand> {
    let mut created: FxHashSet<PathBuf> = FxHashSet::default();
    let mut removed: FxHashSet<PathBuf> = FxHashSet::default();
    let exists = |p: &Path, created: &FxHashSet<PathBuf>, removed: &FxHashSet<PathBuf>| {
        created.contains(p) || (!removed.contains(p) && fs.is_file(p))
    };

    let mut commands = Vec::with_capacity(edits.len());
    for edit in edits {
        match edit.anchored(root) {
            TreeEdit::Upsert { path, content } => {
                if exists(&path, &created, &removed) {
                    let unchanged = !created.contains(&path)
                        && fs.read(&path).is_ok_and(|current| current == content);
                    if unchanged {
                        continue;
                    }
                    commands.push(FileCommand::UpdateFile {
                        old_path: path,
                        new_content: content,
                    });
                } else {
                    removed.remove(&path);
                    created.insert(path.clone());
                    commands.push(FileCommand::CreateFile {
                        new_path: path,
                        new_content: content,
                    });
                }
            }
            TreeEdit::Delete { path } => {
                if !exists(&path, &created, &removed) {
                    debug!(path = %path.display(), "dropping delete of missing file");
                    continue;
                }
                created.remove(&path);
                removed.insert(path.clone());
                commands.push(FileCommand::DeleteFile { old_path: path });
            }
            TreeEdit::Move { from, to } => {
                if !exists(&from, &created, &removed) {
                    debug!(path = %from.display(), "dropping move of missing file");
                    continue;
                }
                created.remove(&from);
                removed.insert(from.clone());
                removed.remove(&to);
                created.insert(to.clone());
                commands.push(FileCommand::MoveFile {
                    old_path: from,
                    new_path: to,
                });
            }
        }
    }
    commands
}

/// Run created and updated content through `formatter`.
pub async fn format_command(command: FileCommand, formatter: &dyn ContentFormatter) -> FileCommand {
    match command {
        FileCommand::CreateFile {
            new_path,
            new_content,
        } => {
            let new_content = formatted(&new_path, new_content, formatter).await;
            FileCommand::CreateFile {
                new_path,
                new_content,
            }
        }
        FileCommand::UpdateFile {
            old_path,
            new_content,
        } => {
            let new_content = formatted(&old_path, new_content, formatter).await;
            FileCommand::UpdateFile {
                old_path,
                new_content,
            }
        }
        other => other,
    }
}

async fn formatted(path: &Path, content: String, formatter: &dyn ContentFormatter) -> String {
    match formatter.format(path, &content).await {
        Ok(out) => out,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "formatting failed; keeping unformatted output");
            content
        }
    }
}
