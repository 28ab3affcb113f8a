//! Path enumeration: turn a resolved pattern set plus a filesystem view into
//! matching absolute file paths.
//!
//! Lazy mode yields a single-pass stream so the pool can start dispatching
//! before the walk finishes. Eager mode collects and sorts. Both report an
//! empty match as [`Matches::Empty`] rather than an empty collection.

use super::types::{PatternSet, ResolutionReason};
use crate::error::{RecastError, Result};
use crate::fs::{FileSystem, FsKind};
use glob::{MatchOptions, Pattern};
use rustc_hash::FxHashSet;
use std::iter::Peekable;
use std::path::{Path, PathBuf};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Outcome of an enumeration.
#[derive(Debug)]
pub enum Matches<T> {
    /// Nothing matched; the caller short-circuits with a notice.
    Empty,
    Found(T),
}

impl<T> Matches<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Finite, non-restartable sequence of matched paths. Order unspecified.
pub struct PathStream {
    inner: Peekable<Box<dyn Iterator<Item = PathBuf> + Send>>,
}

impl PathStream {
    fn new(iter: Box<dyn Iterator<Item = PathBuf> + Send>) -> Self {
        Self {
            inner: iter.peekable(),
        }
    }

    /// Wrap an already-known list.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self::new(Box::new(paths.into_iter()))
    }
}

impl Iterator for PathStream {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.inner.next()
    }
}

impl std::fmt::Debug for PathStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PathStream")
    }
}

/// Compiled exclude rules.
#[derive(Debug, Clone)]
struct Excludes {
    root: PathBuf,
    patterns: Vec<Pattern>,
}

impl Excludes {
    fn compile(set: &PatternSet, root: &Path) -> Result<Self> {
        let patterns = set
            .exclude
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            root: root.to_path_buf(),
            patterns,
        })
    }

    fn matches(&self, path: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
    }

    /// A path is excluded when it, or any directory between it and the
    /// root, matches. Ancestors above the root are never tested.
    fn excludes(&self, path: &Path) -> bool {
        if self.matches(path) {
            return true;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        relative
            .ancestors()
            .filter(|dir| !dir.as_os_str().is_empty())
            .any(|dir| self.matches(dir) || self.matches(&self.root.join(dir)))
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|source| RecastError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Anchor a relative include pattern at `root`.
fn anchored(root: &Path, pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", Pattern::escape(&root.to_string_lossy()), pattern)
    }
}

fn file_list(set: &PatternSet, fs: &dyn FileSystem, excludes: &Excludes) -> Vec<PathBuf> {
    set.include
        .iter()
        .map(PathBuf::from)
        .filter(|p| fs.is_file(p) && !excludes.excludes(p))
        .collect()
}

fn walk_real(set: &PatternSet, root: &Path, excludes: Excludes) -> Result<PathStream> {
    let mut walks = Vec::with_capacity(set.include.len());
    for pattern in &set.include {
        let full = anchored(root, pattern);
        let paths = glob::glob_with(&full, MATCH_OPTIONS).map_err(|source| RecastError::Pattern {
            pattern: full.clone(),
            source,
        })?;
        walks.push(paths);
    }

    let mut seen = FxHashSet::default();
    let iter = walks
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .filter(move |p| !excludes.excludes(p))
        .filter(move |p| seen.insert(p.clone()));
    Ok(PathStream::new(Box::new(iter)))
}

fn walk_listed(
    set: &PatternSet,
    root: &Path,
    listed: Vec<PathBuf>,
    excludes: Excludes,
) -> Result<PathStream> {
    let includes = set
        .include
        .iter()
        .map(|p| compile(&anchored(root, p)))
        .collect::<Result<Vec<_>>>()?;
    let root = root.to_path_buf();
    let iter = listed
        .into_iter()
        .filter(move |p| p.starts_with(&root))
        .filter(move |p| includes.iter().any(|inc| inc.matches_path_with(p, MATCH_OPTIONS)))
        .filter(move |p| !excludes.excludes(p));
    Ok(PathStream::new(Box::new(iter)))
}

/// Lazily enumerate matching files under `root`.
pub fn enumerate_lazy(
    set: &PatternSet,
    root: &Path,
    fs: &dyn FileSystem,
) -> Result<Matches<PathStream>> {
    let excludes = Excludes::compile(set, root)?;

    let mut stream = if set.reason == ResolutionReason::FileList {
        PathStream::from_paths(file_list(set, fs, &excludes))
    } else {
        match (fs.kind(), fs.list_files()) {
            (_, Some(listed)) => walk_listed(set, root, listed, excludes)?,
            (FsKind::Real, None) => walk_real(set, root, excludes)?,
            (FsKind::Virtual, None) => {
                return Err(RecastError::Engine(
                    "virtual filesystem view cannot be listed".to_string(),
                ))
            }
        }
    };

    if stream.inner.peek().is_none() {
        return Ok(Matches::Empty);
    }
    Ok(Matches::Found(stream))
}

/// Enumerate every matching file under `root`, sorted.
pub fn enumerate_eager(
    set: &PatternSet,
    root: &Path,
    fs: &dyn FileSystem,
) -> Result<Matches<Vec<PathBuf>>> {
    match enumerate_lazy(set, root, fs)? {
        Matches::Empty => Ok(Matches::Empty),
        Matches::Found(stream) => {
            let mut paths: Vec<PathBuf> = stream.collect();
            paths.sort();
            paths.dedup();
            Ok(Matches::Found(paths))
        }
    }
}
