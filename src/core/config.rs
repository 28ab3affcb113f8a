//! Runtime configuration (`recast.yaml`).
//!
//! Looked up in the target directory unless a path is given explicitly.
//! A missing file means defaults; every field is optional.

use super::executor::RunnerConfig;
use super::patterns::{PatternResolver, DEFAULT_EXCLUDES};
use super::pool::PoolConfig;
use crate::engines::command::CommandEngine;
use crate::engines::formatter::{CommandFormatter, ContentFormatter};
use crate::error::{RecastError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Config file name looked up in the target directory.
pub const CONFIG_FILE: &str = "recast.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecastConfig {
    /// Worker pool size.
    pub workers: usize,

    /// Seconds without a worker message before the pool is terminated.
    pub idle_timeout_secs: u64,

    /// Ignore file read from the target root.
    pub ignore_file: String,

    /// Standing excludes; an include naming the directory overrides them.
    pub default_excludes: Vec<String>,

    /// Formatter command; content on stdin, `$1` is the path.
    pub format_command: Option<String>,

    /// Structural engine command; `$1` is the rule file, `$2` the path.
    pub structural_command: Option<String>,

    /// Directory for run journals.
    pub journal_dir: Option<PathBuf>,
}

impl Default for RecastConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            idle_timeout_secs: super::pool::DEFAULT_IDLE_TIMEOUT.as_secs(),
            ignore_file: ".gitignore".to_string(),
            default_excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            format_command: None,
            structural_command: None,
            journal_dir: None,
        }
    }
}

impl RecastConfig {
    /// Parse a config file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(RecastError::io("read config", path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(&content).map_err(|source| RecastError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given (it must exist), else `recast.yaml` under
    /// `target`. The result is validated.
    pub fn discover(explicit: Option<&Path>, target: &Path) -> Result<Self> {
        let config = match explicit {
            Some(path) if !path.exists() => {
                return Err(RecastError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )))
            }
            Some(path) => Self::load(path)?,
            None => Self::load(&target.join(CONFIG_FILE))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.workers == 0 {
            problems.push("workers must be at least 1");
        }
        if self.idle_timeout_secs == 0 {
            problems.push("idle_timeout_secs must be at least 1");
        }
        if self.ignore_file.trim().is_empty() {
            problems.push("ignore_file must not be empty");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(RecastError::Config(problems.join("; ")))
        }
    }

    /// Runner settings derived from this config.
    pub fn runner_config(&self) -> RunnerConfig {
        let formatter = self
            .format_command
            .as_ref()
            .map(|cmd| Arc::new(CommandFormatter::new(cmd.clone())) as Arc<dyn ContentFormatter>);
        RunnerConfig {
            pool: PoolConfig {
                workers: self.workers,
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            },
            resolver: PatternResolver {
                ignore_file: self.ignore_file.clone(),
                default_excludes: self.default_excludes.clone(),
            },
            formatter,
            journal_dir: self.journal_dir.clone(),
        }
    }

    /// The shell-backed engine wired with this config.
    pub fn engine(&self) -> CommandEngine {
        CommandEngine::new(self.structural_command.clone())
    }
}
