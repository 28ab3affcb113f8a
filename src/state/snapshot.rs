//! Net diff between two snapshots of the same tree.
//!
//! The comparison basis is path plus content hash. Same content under a new
//! path is reported as a delete and a create; renames are not detected.

use super::hasher;
use crate::core::types::FileCommand;
use crate::fs::memory::Snapshot;

/// Counts of a computed diff, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub unchanged: u32,
}

/// Commands that take `original` to `current`, in path order.
///
/// Intermediate history is irrelevant: a file created then deleted between
/// the two snapshots does not appear, and a file edited several times yields
/// a single update carrying the final content.
pub fn net_diff(original: &Snapshot, current: &Snapshot) -> Vec<FileCommand> {
    let mut commands = Vec::new();

    for (path, content) in current {
        match original.get(path) {
            None => commands.push(FileCommand::CreateFile {
                new_path: path.clone(),
                new_content: content.clone(),
            }),
            Some(before) if hasher::hash_string(before) != hasher::hash_string(content) => {
                commands.push(FileCommand::UpdateFile {
                    old_path: path.clone(),
                    new_content: content.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for path in original.keys() {
        if !current.contains_key(path) {
            commands.push(FileCommand::DeleteFile {
                old_path: path.clone(),
            });
        }
    }

    commands.sort_by(|a, b| a.path().cmp(b.path()));
    commands
}

/// Tally a diff for summaries.
pub fn count(original: &Snapshot, commands: &[FileCommand]) -> DiffCounts {
    let mut counts = DiffCounts::default();
    for cmd in commands {
        match cmd {
            FileCommand::CreateFile { .. } => counts.created += 1,
            FileCommand::UpdateFile { .. } => counts.updated += 1,
            FileCommand::DeleteFile { .. } => counts.deleted += 1,
            FileCommand::MoveFile { .. } => {}
        }
    }
    let touched = (counts.updated + counts.deleted) as usize;
    counts.unchanged = original.len().saturating_sub(touched) as u32;
    counts
}
