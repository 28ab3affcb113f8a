//! Shared types: codemod descriptors, run settings, pattern sets, file
//! commands, progress and run messages.
//!
//! Wire-facing types derive Serialize/Deserialize with camelCase field names
//! so JSON output matches the command and message shapes consumers expect.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Codemod descriptor
// ============================================================================

/// A transform plus the metadata needed to schedule it.
///
/// A recipe is a codemod whose `steps` are non-empty. It owns its steps for
/// the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codemod {
    /// Display name, also used to tag errors and progress.
    pub name: String,

    /// Execution strategy declared by the codemod.
    pub engine: EngineKind,

    /// Transform source location (script, rule file). Recipes have none.
    #[serde(default)]
    pub transform: Option<PathBuf>,

    /// Codemod-declared include patterns.
    #[serde(default)]
    pub include: Vec<String>,

    /// Default arguments handed to the transform.
    #[serde(default)]
    pub arguments: IndexMap<String, serde_json::Value>,

    /// Nested codemods, run in order.
    #[serde(default)]
    pub steps: Vec<Codemod>,

    /// Where the codemod came from.
    #[serde(default)]
    pub source: CodemodSource,
}

impl Codemod {
    pub fn is_recipe(&self) -> bool {
        self.engine == EngineKind::Recipe || !self.steps.is_empty()
    }
}

/// Provenance of a codemod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CodemodSource {
    #[default]
    Local,
    Package {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
}

impl fmt::Display for CodemodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Package {
                name,
                version: Some(v),
            } => write!(f, "{}@{}", name, v),
            Self::Package {
                name,
                version: None,
            } => write!(f, "{}", name),
        }
    }
}

/// Closed set of engine kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Per-file source transform; defaults to JS/TS files.
    SourceFile,
    /// Per-file text transform; defaults to every file.
    Text,
    /// One pass over the whole matched tree.
    FileTree,
    /// Structural pattern rewriting driven by a rule file.
    Structural,
    /// Runs a script directly; manages its own side effects.
    Script,
    /// Ordered sequence of nested codemods.
    Recipe,
    /// Deprecated engine, kept so descriptors still parse.
    Piranha,
}

/// How the dispatcher executes an engine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PerFile,
    WholeTree,
    DirectScript,
    Recipe,
    Unsupported,
}

const SOURCE_FILE_DEFAULTS: &[&str] = &[
    "**/*.js", "**/*.jsx", "**/*.mjs", "**/*.cjs", "**/*.ts", "**/*.tsx", "**/*.mts", "**/*.cts",
];

impl EngineKind {
    pub fn strategy(self) -> Strategy {
        match self {
            Self::SourceFile | Self::Text | Self::Structural => Strategy::PerFile,
            Self::FileTree => Strategy::WholeTree,
            Self::Script => Strategy::DirectScript,
            Self::Recipe => Strategy::Recipe,
            Self::Piranha => Strategy::Unsupported,
        }
    }

    /// Include patterns the engine family falls back to when nothing else
    /// declares includes. Empty means "everything".
    pub fn default_includes(self) -> &'static [&'static str] {
        match self {
            Self::SourceFile => SOURCE_FILE_DEFAULTS,
            Self::Text | Self::FileTree | Self::Structural | Self::Script | Self::Recipe => &[],
            Self::Piranha => &[],
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFile => write!(f, "source-file"),
            Self::Text => write!(f, "text"),
            Self::FileTree => write!(f, "file-tree"),
            Self::Structural => write!(f, "structural"),
            Self::Script => write!(f, "script"),
            Self::Recipe => write!(f, "recipe"),
            Self::Piranha => write!(f, "piranha"),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Immutable per-run file selection and scheduling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    /// Root of the tree the codemod runs against.
    pub target: PathBuf,

    /// Settings-level include patterns (highest precedence).
    pub include: Vec<String>,

    /// Settings-level exclude patterns.
    pub exclude: Vec<String>,

    /// Explicit file list; overrides all pattern logic.
    pub files: Option<Vec<PathBuf>>,

    /// Size of the worker pool.
    pub workers: usize,

    /// Run created/updated content through the formatter.
    pub format: bool,
}

impl FlowSettings {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            files: None,
            workers: 1,
            format: false,
        }
    }
}

/// Whether edits land on disk, plus traceability.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSettings {
    pub dry_run: bool,

    /// Identifier used for journals and logs only.
    pub run_id: String,

    /// Argument overrides merged over the codemod's declared arguments.
    pub arguments: IndexMap<String, serde_json::Value>,
}

// ============================================================================
// Patterns
// ============================================================================

/// Resolved include/exclude globs. Sets, so duplicates collapse and order is
/// irrelevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
    pub reason: ResolutionReason,
}

/// Which source the include patterns came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionReason {
    FileList,
    Settings,
    Codemod,
    EngineDefaults,
    Default,
    StructuralLanguage(String),
    StructuralOverride,
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileList => write!(f, "explicit file list given; include patterns ignored"),
            Self::Settings => write!(f, "include patterns from settings"),
            Self::Codemod => write!(f, "include patterns declared by the codemod"),
            Self::EngineDefaults => write!(f, "engine default include patterns"),
            Self::Default => write!(f, "no include patterns given; matching all files"),
            Self::StructuralLanguage(lang) => write!(
                f,
                "structural engine ignores include patterns; using extensions for language '{}'",
                lang
            ),
            Self::StructuralOverride => write!(
                f,
                "structural engine ignores include patterns; rule language unavailable, matching all files"
            ),
        }
    }
}

// ============================================================================
// File commands
// ============================================================================

/// Normalized unit of edit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FileCommand {
    CreateFile {
        new_path: PathBuf,
        new_content: String,
    },
    UpdateFile {
        old_path: PathBuf,
        new_content: String,
    },
    DeleteFile {
        old_path: PathBuf,
    },
    MoveFile {
        old_path: PathBuf,
        new_path: PathBuf,
    },
}

impl FileCommand {
    /// Path that must exist in the view the command was derived from.
    pub fn old_path(&self) -> Option<&Path> {
        match self {
            Self::CreateFile { .. } => None,
            Self::UpdateFile { old_path, .. }
            | Self::DeleteFile { old_path }
            | Self::MoveFile { old_path, .. } => Some(old_path),
        }
    }

    /// Path the command is primarily about, for display.
    pub fn path(&self) -> &Path {
        match self {
            Self::CreateFile { new_path, .. } => new_path,
            Self::UpdateFile { old_path, .. }
            | Self::DeleteFile { old_path }
            | Self::MoveFile { old_path, .. } => old_path,
        }
    }

    pub fn new_content(&self) -> Option<&str> {
        match self {
            Self::CreateFile { new_content, .. } | Self::UpdateFile { new_content, .. } => {
                Some(new_content)
            }
            Self::DeleteFile { .. } | Self::MoveFile { .. } => None,
        }
    }
}

impl fmt::Display for FileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateFile { new_path, .. } => write!(f, "+ {}", new_path.display()),
            Self::UpdateFile { old_path, .. } => write!(f, "~ {}", old_path.display()),
            Self::DeleteFile { old_path } => write!(f, "- {}", old_path.display()),
            Self::MoveFile { old_path, new_path } => {
                write!(f, "> {} -> {}", old_path.display(), new_path.display())
            }
        }
    }
}

// ============================================================================
// Progress and messages
// ============================================================================

/// Progress counters, owned by whichever component drives execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub processed: u64,
    pub total: u64,
    pub current_file: Option<PathBuf>,
}

/// Messages surfaced to the caller during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunMessage {
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        codemod_name: Option<String>,
        processed_file_number: u64,
        total_file_number: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processed_file_name: Option<PathBuf>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        codemod_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    Notice {
        message: String,
    },
}

impl RunMessage {
    pub fn progress(codemod_name: &str, state: &ProgressState) -> Self {
        Self::Progress {
            codemod_name: Some(codemod_name.to_string()),
            processed_file_number: state.processed,
            total_file_number: state.total,
            processed_file_name: state.current_file.clone(),
        }
    }

    pub fn file_error(codemod_name: &str, path: &Path, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            codemod_name: Some(codemod_name.to_string()),
            path: Some(path.to_path_buf()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Receives messages and commands as a run produces them.
///
/// Callbacks are only ever invoked from the coordinating task, never
/// concurrently.
pub trait RunObserver: Send {
    fn on_message(&mut self, message: RunMessage);
    fn on_command(&mut self, command: FileCommand);
}

/// Observer that keeps everything it receives.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    pub messages: Vec<RunMessage>,
    pub commands: Vec<FileCommand>,
}

impl CollectingObserver {
    pub fn errors(&self) -> impl Iterator<Item = &RunMessage> {
        self.messages.iter().filter(|m| m.is_error())
    }

    pub fn notices(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|m| match m {
            RunMessage::Notice { message } => Some(message.as_str()),
            _ => None,
        })
    }
}

impl RunObserver for CollectingObserver {
    fn on_message(&mut self, message: RunMessage) {
        self.messages.push(message);
    }

    fn on_command(&mut self, command: FileCommand) {
        self.commands.push(command);
    }
}

// ============================================================================
// Run result
// ============================================================================

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub commands: usize,
    pub processed_files: u64,
    pub total_files: u64,
    pub errors: usize,
    /// Enumeration matched nothing; no engine was invoked.
    pub no_files: bool,
    /// The worker pool was terminated by the idle timer.
    pub timed_out: bool,
}

impl RunSummary {
    /// Fold a nested step's summary into this one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.commands += other.commands;
        self.processed_files += other.processed_files;
        self.total_files += other.total_files;
        self.errors += other.errors;
        self.timed_out |= other.timed_out;
    }
}

// ============================================================================
// Tests
// ============================================================================
