//! Pattern resolution: derive the final include/exclude glob sets from
//! settings, codemod metadata, engine defaults and the root ignore file.
//!
//! Precedence for includes: explicit file list > settings includes >
//! codemod includes > engine defaults > everything. The structural engine
//! never honors include patterns; it matches by the language its rule file
//! declares.

use super::types::{Codemod, EngineKind, FlowSettings, PatternSet, ResolutionReason};
use crate::engines::structural;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Glob that matches every file.
pub const MATCH_ALL: &str = "**/*";

/// Directories nobody wants rewritten unless they ask for it.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/node_modules/**/*", "**/.git/**/*"];

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct PatternResolver {
    /// Ignore file looked up once at the target root.
    pub ignore_file: String,
    /// Standing excludes that an explicit include can override.
    pub default_excludes: Vec<String>,
}

impl Default for PatternResolver {
    fn default() -> Self {
        Self {
            ignore_file: ".gitignore".to_string(),
            default_excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Normalize a raw pattern.
///
/// Directory patterns (`foo/`) expand to everything beneath them. Patterns
/// that already start with `**` or are absolute pass through; anything else
/// gets a `**/` prefix so relative fragments match anywhere in the tree.
pub fn normalize_pattern(raw: &str) -> String {
    let mut pattern = raw.trim().to_string();
    if pattern.ends_with('/') {
        pattern.push_str("**/*");
    }
    if pattern.starts_with("**") || Path::new(&pattern).is_absolute() {
        return pattern;
    }
    let relative = pattern.strip_prefix("./").unwrap_or(&pattern);
    format!("**/{}", relative)
}

/// Parse ignore-file content into normalized exclude patterns.
///
/// Comments, blank lines and negations are skipped. Root-anchored lines
/// (`/dist`) are anchored to `root`.
pub fn parse_ignore_lines(content: &str, root: &Path) -> Vec<String> {
    let mut patterns = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('!') {
            debug!(line, "negated ignore lines are not supported; skipping");
            continue;
        }
        if let Some(anchored) = line.strip_prefix('/') {
            let mut pattern = format!(
                "{}/{}",
                glob::Pattern::escape(&root.to_string_lossy()),
                anchored
            );
            if pattern.ends_with('/') {
                pattern.push_str("**/*");
            }
            patterns.push(pattern);
        } else {
            patterns.push(normalize_pattern(line));
        }
    }
    patterns
}

/// Read the ignore file at `root`. A single lookup; no tree walk.
fn ignore_file_patterns(root: &Path, file_name: &str) -> Vec<String> {
    let path = root.join(file_name);
    match std::fs::read_to_string(&path) {
        Ok(content) => parse_ignore_lines(&content, root),
        Err(_) => Vec::new(),
    }
}

/// Literal (wildcard-free) path components of a pattern.
fn literal_components(pattern: &str) -> impl Iterator<Item = &str> {
    pattern
        .split('/')
        .filter(|c| !c.is_empty() && !c.contains(['*', '?', '[']))
}

/// Whether an include pattern explicitly reaches into a default-excluded
/// directory.
fn overrides_default(default_exclude: &str, include: &BTreeSet<String>) -> bool {
    if include.contains(default_exclude) {
        return true;
    }
    literal_components(default_exclude).any(|dir| {
        include
            .iter()
            .any(|inc| inc.split('/').any(|component| component == dir))
    })
}

impl PatternResolver {
    /// Resolve the pattern set for one codemod run.
    ///
    /// Engine defaults are used only when neither settings nor the codemod
    /// declare includes. Unioning them with declared includes would widen
    /// every explicit selection to the engine's whole extension set.
    ///
    /// Excludes name files or directories; enumeration prunes everything
    /// under an excluded directory.
    pub fn resolve(&self, settings: &FlowSettings, codemod: &Codemod) -> PatternSet {
        let mut exclude: BTreeSet<String> =
            settings.exclude.iter().map(|p| normalize_pattern(p)).collect();
        exclude.extend(ignore_file_patterns(&settings.target, &self.ignore_file));

        if let Some(files) = &settings.files {
            let include = files
                .iter()
                .map(|f| crate::fs::absolutize(&settings.target, f).to_string_lossy().to_string())
                .collect();
            exclude.extend(self.default_excludes.iter().cloned());
            return PatternSet {
                include,
                exclude,
                reason: ResolutionReason::FileList,
            };
        }

        let (mut base, mut reason): (BTreeSet<String>, ResolutionReason) =
            if !settings.include.is_empty() {
                (
                    settings.include.iter().map(|p| normalize_pattern(p)).collect(),
                    ResolutionReason::Settings,
                )
            } else if !codemod.include.is_empty() {
                (
                    codemod.include.iter().map(|p| normalize_pattern(p)).collect(),
                    ResolutionReason::Codemod,
                )
            } else {
                (BTreeSet::new(), ResolutionReason::Default)
            };

        if codemod.engine == EngineKind::Structural {
            let language = codemod
                .transform
                .as_deref()
                .and_then(structural::rule_language)
                .and_then(|lang| structural::language_patterns(&lang).map(|p| (lang, p)));
            match language {
                Some((lang, patterns)) => {
                    base = patterns.iter().map(|p| p.to_string()).collect();
                    reason = ResolutionReason::StructuralLanguage(lang);
                }
                None => {
                    base = BTreeSet::new();
                    reason = ResolutionReason::StructuralOverride;
                }
            }
        }

        if reason == ResolutionReason::Default {
            let defaults: BTreeSet<String> = codemod
                .engine
                .default_includes()
                .iter()
                .map(|p| p.to_string())
                .filter(|p| !exclude.contains(p))
                .collect();
            if !defaults.is_empty() {
                base = defaults;
                reason = ResolutionReason::EngineDefaults;
            }
        }

        if base.is_empty() {
            base.insert(MATCH_ALL.to_string());
        }

        for default in &self.default_excludes {
            if overrides_default(default, &base) {
                debug!(pattern = %default, "default exclude overridden by include patterns");
            } else {
                exclude.insert(default.clone());
            }
        }

        debug!(
            include = base.len(),
            exclude = exclude.len(),
            reason = %reason,
            "resolved pattern set"
        );
        PatternSet {
            include: base,
            exclude,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CodemodSource;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn codemod(engine: EngineKind, include: &[&str]) -> Codemod {
        Codemod {
            name: "demo".into(),
            engine,
            transform: None,
            include: include.iter().map(|s| s.to_string()).collect(),
            arguments: Default::default(),
            steps: vec![],
            source: CodemodSource::Local,
        }
    }

    fn settings(dir: &Path) -> FlowSettings {
        FlowSettings::new(dir)
    }

    #[test]
    fn test_patterns_normalize_relative() {
        assert_eq!(normalize_pattern("*.ts"), "**/*.ts");
        assert_eq!(normalize_pattern("./src/a.ts"), "**/src/a.ts");
    }

    #[test]
    fn test_patterns_normalize_directory() {
        assert_eq!(normalize_pattern("foo/"), "**/foo/**/*");
        let pattern = glob::Pattern::new(&normalize_pattern("foo/")).unwrap();
        assert!(pattern.matches("foo/a.ts"));
        assert!(pattern.matches("x/foo/deep/b.ts"));
        assert!(!pattern.matches("foobar/a.ts"));
    }

    #[test]
    fn test_patterns_normalize_passthrough() {
        assert_eq!(normalize_pattern("**/*.tsx"), "**/*.tsx");
        assert_eq!(normalize_pattern("/abs/path/*.js"), "/abs/path/*.js");
    }

    #[test]
    fn test_patterns_precedence_settings_over_codemod() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["lib/*.js".into()];
        let set = PatternResolver::default().resolve(&s, &codemod(EngineKind::Text, &["src/*.ts"]));
        assert_eq!(set.reason, ResolutionReason::Settings);
        assert!(set.include.contains("**/lib/*.js"));
        assert!(!set.include.contains("**/src/*.ts"));
    }

    #[test]
    fn test_patterns_codemod_include_used() {
        let dir = tempfile::tempdir().unwrap();
        let set = PatternResolver::default()
            .resolve(&settings(dir.path()), &codemod(EngineKind::SourceFile, &["src/*.ts"]));
        assert_eq!(set.reason, ResolutionReason::Codemod);
        assert_eq!(set.include.len(), 1);
    }

    #[test]
    fn test_patterns_engine_defaults_when_nothing_declared() {
        let dir = tempfile::tempdir().unwrap();
        let set = PatternResolver::default()
            .resolve(&settings(dir.path()), &codemod(EngineKind::SourceFile, &[]));
        assert_eq!(set.reason, ResolutionReason::EngineDefaults);
        assert!(set.include.contains("**/*.ts"));
        assert!(!set.include.contains(MATCH_ALL));
    }

    #[test]
    fn test_patterns_engine_defaults_filtered_by_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.exclude = vec!["**/*.cjs".into()];
        let set = PatternResolver::default().resolve(&s, &codemod(EngineKind::SourceFile, &[]));
        assert!(!set.include.contains("**/*.cjs"));
        assert!(set.include.contains("**/*.mjs"));
    }

    #[test]
    fn test_patterns_default_matches_everything() {
        let dir = tempfile::tempdir().unwrap();
        let set = PatternResolver::default().resolve(&settings(dir.path()), &codemod(EngineKind::Text, &[]));
        assert_eq!(set.reason, ResolutionReason::Default);
        assert_eq!(set.include, BTreeSet::from([MATCH_ALL.to_string()]));
        assert!(set.exclude.contains("**/node_modules/**/*"));
    }

    #[test]
    fn test_patterns_file_list_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["*.ts".into()];
        s.files = Some(vec![PathBuf::from("src/only.ts")]);
        let set = PatternResolver::default().resolve(&s, &codemod(EngineKind::Text, &["*.js"]));
        assert_eq!(set.reason, ResolutionReason::FileList);
        let expected = dir.path().join("src/only.ts").to_string_lossy().to_string();
        assert_eq!(set.include, BTreeSet::from([expected]));
    }

    #[test]
    fn test_patterns_ignore_file_merged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "# comment\n\ncoverage/\n*.log\n!keep.log\n/dist\n")
            .unwrap();
        let set = PatternResolver::default().resolve(&settings(dir.path()), &codemod(EngineKind::Text, &[]));
        assert!(set.exclude.contains("**/coverage/**/*"));
        assert!(set.exclude.contains("**/*.log"));
        assert!(!set.exclude.iter().any(|p| p.contains("keep.log")));
        assert!(!set.exclude.iter().any(|p| p.contains("comment")));
    }

    #[test]
    fn test_patterns_include_overrides_default_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["node_modules/my-lib/**/*.js".into()];
        let set = PatternResolver::default().resolve(&s, &codemod(EngineKind::Text, &[]));
        assert!(!set.exclude.contains("**/node_modules/**/*"));
        assert!(set.exclude.contains("**/.git/**/*"));
    }

    #[test]
    fn test_patterns_settings_exclude_not_dropped_by_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["node_modules/x/*.js".into()];
        s.exclude = vec!["node_modules/".into()];
        let set = PatternResolver::default().resolve(&s, &codemod(EngineKind::Text, &[]));
        assert!(set.exclude.contains("**/node_modules/**/*"));
    }

    #[test]
    fn test_patterns_structural_ignores_includes() {
        let dir = tempfile::tempdir().unwrap();
        let rule = dir.path().join("rule.yaml");
        std::fs::write(&rule, "id: no-console\nlanguage: TypeScript\nrule:\n  pattern: console.log($A)\n")
            .unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["anything/*.md".into()];
        let mut cm = codemod(EngineKind::Structural, &["src/*.js"]);
        cm.transform = Some(rule);

        let set = PatternResolver::default().resolve(&s, &cm);
        assert_eq!(set.reason, ResolutionReason::StructuralLanguage("typescript".into()));
        assert!(set.include.contains("**/*.ts"));
        assert!(!set.include.iter().any(|p| p.contains(".md") || p.contains("src")));
        assert!(set.reason.to_string().contains("ignores include patterns"));
    }

    #[test]
    fn test_patterns_structural_unreadable_rule_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.include = vec!["src/".into()];
        let mut cm = codemod(EngineKind::Structural, &[]);
        cm.transform = Some(dir.path().join("missing.yaml"));
        let set = PatternResolver::default().resolve(&s, &cm);
        assert_eq!(set.reason, ResolutionReason::StructuralOverride);
        assert_eq!(set.include, BTreeSet::from([MATCH_ALL.to_string()]));
        assert!(set.reason.to_string().contains("ignores include patterns"));
    }

    proptest! {
        #[test]
        fn prop_patterns_order_independent(
            includes in proptest::collection::vec("[a-z]{1,6}(/)?(\\*\\.[a-z]{1,3})?", 0..6),
            excludes in proptest::collection::vec("[a-z]{1,6}/", 0..4),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let resolver = PatternResolver::default();
            let cm = codemod(EngineKind::Text, &[]);

            let mut forward = settings(dir.path());
            forward.include = includes.clone();
            forward.exclude = excludes.clone();

            let mut reversed = forward.clone();
            reversed.include.reverse();
            reversed.exclude.reverse();
            let mut doubled = forward.clone();
            doubled.include.extend(includes.iter().cloned());

            let a = resolver.resolve(&forward, &cm);
            let b = resolver.resolve(&reversed, &cm);
            let c = resolver.resolve(&doubled, &cm);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a.include, &c.include);
            prop_assert_eq!(&a, &resolver.resolve(&forward, &cm));
        }
    }
}
