//! Transform engine seam.
//!
//! The orchestration core never interprets transform semantics. It hands an
//! engine the static inputs for a file, a tree or a script and gets raw
//! output back, which `core::commands` normalizes into file commands.

pub mod command;
pub mod formatter;
pub mod structural;

use crate::core::types::{Codemod, EngineKind};
use crate::error::{RecastError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Argument record passed to every transform.
pub type Arguments = IndexMap<String, serde_json::Value>;

/// Transform source read once per run and shared by every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSource {
    pub path: PathBuf,
    pub text: String,
}

impl TransformSource {
    /// Read the codemod's transform. A codemod without a transform, or one
    /// whose transform cannot be read, is a configuration error.
    pub fn load(codemod: &Codemod) -> Result<Self> {
        let path = codemod.transform.as_ref().ok_or_else(|| {
            RecastError::Config(format!("codemod '{}' has no transform", codemod.name))
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| RecastError::TransformLoad {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path: path.clone(),
            text,
        })
    }

    pub fn inline(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// One path plus the transform's static inputs. Owned by the worker running
/// it and dropped when the file is done.
#[derive(Debug, Clone)]
pub struct WorkerTask {
    pub engine: EngineKind,
    /// Run target directory.
    pub target: PathBuf,
    pub path: PathBuf,
    pub content: String,
    pub source: Arc<TransformSource>,
    pub arguments: Arc<Arguments>,
}

/// Input to a whole-tree pass.
#[derive(Debug, Clone)]
pub struct TreeInput {
    pub root: PathBuf,
    /// Every matched file and its content, sorted by path.
    pub files: Vec<TreeFile>,
    pub source: Arc<TransformSource>,
    pub arguments: Arc<Arguments>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeFile {
    pub path: PathBuf,
    pub content: String,
}

/// Input to a direct script run.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    pub target: PathBuf,
    pub source: Arc<TransformSource>,
    pub arguments: Arc<Arguments>,
}

/// Raw edit produced by a whole-tree pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TreeEdit {
    /// Write `content` at `path`, creating the file if needed.
    Upsert { path: PathBuf, content: String },
    Delete { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl TreeEdit {
    /// Resolve relative paths against the run root.
    pub fn anchored(self, root: &Path) -> Self {
        let abs = |p: PathBuf| crate::fs::absolutize(root, &p);
        match self {
            Self::Upsert { path, content } => Self::Upsert {
                path: abs(path),
                content,
            },
            Self::Delete { path } => Self::Delete { path: abs(path) },
            Self::Move { from, to } => Self::Move {
                from: abs(from),
                to: abs(to),
            },
        }
    }
}

/// Runs transforms. Implementations must be shareable across pool workers.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Check the engine can serve `kind` before anything is enumerated.
    /// An error here is a fatal configuration error.
    fn preflight(&self, kind: EngineKind) -> std::result::Result<(), String> {
        let _ = kind;
        Ok(())
    }

    /// Per-file pass. `Ok(None)` means the file is unchanged.
    async fn transform_file(&self, task: &WorkerTask) -> std::result::Result<Option<String>, String>;

    /// Whole-tree pass, invoked exactly once per run.
    async fn transform_tree(&self, input: &TreeInput) -> std::result::Result<Vec<TreeEdit>, String>;

    /// Direct script; side effects are the script's own business.
    async fn run_script(&self, input: &ScriptInput) -> std::result::Result<(), String>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CodemodSource;

    fn codemod(transform: Option<PathBuf>) -> Codemod {
        Codemod {
            name: "demo".into(),
            engine: EngineKind::Text,
            transform,
            include: vec![],
            arguments: Default::default(),
            steps: vec![],
            source: CodemodSource::Local,
        }
    }

    #[test]
    fn test_engines_source_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sh");
        std::fs::write(&path, "cat").unwrap();
        let src = TransformSource::load(&codemod(Some(path.clone()))).unwrap();
        assert_eq!(src.text, "cat");
        assert_eq!(src.path, path);
    }

    #[test]
    fn test_engines_source_load_missing_is_fatal() {
        let err = TransformSource::load(&codemod(Some("/nonexistent/t.sh".into()))).unwrap_err();
        assert!(matches!(err, RecastError::TransformLoad { .. }));
        assert!(err.is_configuration());
        let err = TransformSource::load(&codemod(None)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_engines_tree_edit_wire_shape() {
        let edits: Vec<TreeEdit> = serde_json::from_str(
            r#"[{"op":"upsert","path":"a.ts","content":"x"},{"op":"delete","path":"/abs/b.ts"},{"op":"move","from":"c","to":"d"}]"#,
        )
        .unwrap();
        assert_eq!(edits.len(), 3);
        let anchored: Vec<_> = edits.into_iter().map(|e| e.anchored(Path::new("/r"))).collect();
        assert_eq!(
            anchored[0],
            TreeEdit::Upsert {
                path: "/r/a.ts".into(),
                content: "x".into()
            }
        );
        assert_eq!(anchored[1], TreeEdit::Delete { path: "/abs/b.ts".into() });
        assert_eq!(
            anchored[2],
            TreeEdit::Move {
                from: "/r/c".into(),
                to: "/r/d".into()
            }
        );
    }
}
