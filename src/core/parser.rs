//! Codemod descriptor loading and validation.
//!
//! Parses `codemod.yaml` and validates structural constraints:
//! - Names are non-empty and use `[A-Za-z0-9._-]`
//! - Recipes have steps and no transform
//! - Everything else has a transform and no steps
//! - Deprecated engine kinds are rejected
//! - Step names are unique within a recipe
//!
//! Steps may be inline descriptors or `{ path: other.yaml }` references.
//! Transform and step paths are resolved relative to the descriptor that
//! declares them.

use super::types::*;
use crate::error::{RecastError, Result};
use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok());

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A descriptor as written on disk.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(title = "Codemod")]
pub struct RawCodemod {
    /// Display name; tags errors and progress.
    pub name: String,
    /// Engine kind.
    pub engine: EngineKind,
    /// Transform source, relative to this descriptor.
    #[serde(default)]
    pub transform: Option<PathBuf>,
    /// Include globs.
    #[serde(default)]
    pub include: Vec<String>,
    /// Default transform arguments.
    #[serde(default)]
    pub arguments: IndexMap<String, serde_json::Value>,
    /// Recipe steps, run in order.
    #[serde(default)]
    pub steps: Vec<RawStep>,
    #[serde(default)]
    pub source: CodemodSource,
}

/// A recipe step: a reference to another descriptor, or an inline one.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawStep {
    Ref(StepRef),
    Inline(Box<RawCodemod>),
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StepRef {
    /// Descriptor path, relative to the referencing descriptor.
    pub path: PathBuf,
}

/// Parse a descriptor from a string.
pub fn parse_codemod(yaml: &str) -> std::result::Result<RawCodemod, serde_yaml_ng::Error> {
    serde_yaml_ng::from_str(yaml)
}

/// Load a descriptor from disk, resolving step references and relative
/// transform paths. Reference cycles are a configuration error.
pub fn load_codemod(path: &Path) -> Result<Codemod> {
    let mut chain = Vec::new();
    load_at(path, &mut chain)
}

fn load_at(path: &Path, chain: &mut Vec<PathBuf>) -> Result<Codemod> {
    let path = std::path::absolute(path).map_err(|e| RecastError::io("resolve", path, e))?;
    if chain.contains(&path) {
        return Err(RecastError::Config(format!(
            "recipe step cycle through {}",
            path.display()
        )));
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| RecastError::io("read codemod", &path, e))?;
    let raw = parse_codemod(&content).map_err(|source| RecastError::Yaml {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), name = %raw.name, "loaded codemod descriptor");

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    chain.push(path);
    let codemod = resolve(raw, &base, chain);
    chain.pop();
    codemod
}

fn resolve(raw: RawCodemod, base: &Path, chain: &mut Vec<PathBuf>) -> Result<Codemod> {
    let mut steps = Vec::with_capacity(raw.steps.len());
    for step in raw.steps {
        steps.push(match step {
            RawStep::Ref(r) => load_at(&base.join(r.path), chain)?,
            RawStep::Inline(inline) => resolve(*inline, base, chain)?,
        });
    }
    Ok(Codemod {
        name: raw.name,
        engine: raw.engine,
        transform: raw.transform.map(|t| base.join(t)),
        include: raw.include,
        arguments: raw.arguments,
        steps,
        source: raw.source,
    })
}

/// Validate a loaded codemod. Returns a list of errors (empty = valid).
pub fn validate_codemod(codemod: &Codemod) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_into(codemod, &codemod.name, &mut errors);
    errors
}

fn validate_into(codemod: &Codemod, label: &str, errors: &mut Vec<ValidationError>) {
    let mut push = |message: String| {
        errors.push(ValidationError {
            message: format!("codemod '{}': {}", label, message),
        })
    };

    if codemod.name.is_empty() {
        push("name must not be empty".to_string());
    } else if !NAME_RE.as_ref().is_some_and(|re| re.is_match(&codemod.name)) {
        push(format!(
            "name '{}' may only contain letters, digits, '.', '_' and '-'",
            codemod.name
        ));
    }

    match codemod.engine {
        EngineKind::Piranha => push("engine 'piranha' is no longer supported".to_string()),
        EngineKind::Recipe => {
            if codemod.steps.is_empty() {
                push("recipe has no steps".to_string());
            }
            if codemod.transform.is_some() {
                push("recipe must not declare a transform".to_string());
            }
        }
        engine => {
            if !codemod.steps.is_empty() {
                push(format!("engine '{}' cannot have steps", engine));
            }
            if codemod.transform.is_none() {
                push(format!("engine '{}' requires a transform", engine));
            }
        }
    }

    let mut seen = HashSet::new();
    for step in &codemod.steps {
        if !seen.insert(step.name.as_str()) {
            push(format!("duplicate step name '{}'", step.name));
        }
    }

    for step in &codemod.steps {
        validate_into(step, &format!("{}/{}", label, step.name), errors);
    }
}

/// JSON Schema for descriptors.
pub fn codemod_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(RawCodemod)
}
