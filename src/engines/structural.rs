//! Structural rule files: read the declared language and map it to the
//! file extensions the structural engine understands.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Extension patterns per canonical language name.
const LANGUAGES: &[(&str, &[&str])] = &[
    ("bash", &["**/*.sh", "**/*.bash"]),
    ("c", &["**/*.c", "**/*.h"]),
    ("cpp", &["**/*.cc", "**/*.cpp", "**/*.cxx", "**/*.hpp", "**/*.hh", "**/*.hxx"]),
    ("csharp", &["**/*.cs"]),
    ("css", &["**/*.css"]),
    ("go", &["**/*.go"]),
    ("html", &["**/*.html", "**/*.htm"]),
    ("java", &["**/*.java"]),
    ("javascript", &["**/*.js", "**/*.jsx", "**/*.mjs", "**/*.cjs"]),
    ("json", &["**/*.json"]),
    ("kotlin", &["**/*.kt", "**/*.kts"]),
    ("lua", &["**/*.lua"]),
    ("php", &["**/*.php"]),
    ("python", &["**/*.py", "**/*.pyi"]),
    ("ruby", &["**/*.rb"]),
    ("rust", &["**/*.rs"]),
    ("scala", &["**/*.scala"]),
    ("swift", &["**/*.swift"]),
    ("tsx", &["**/*.tsx"]),
    ("typescript", &["**/*.ts", "**/*.mts", "**/*.cts"]),
    ("yaml", &["**/*.yaml", "**/*.yml"]),
];

/// Canonical lowercase name for a declared language, resolving aliases.
pub fn canonical_language(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "sh" => "bash",
        "c++" | "cc" => "cpp",
        "cs" | "c#" => "csharp",
        "golang" => "go",
        "js" | "jsx" => "javascript",
        "kt" => "kotlin",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "ts" => "typescript",
        "yml" => "yaml",
        other => other,
    };
    canonical.to_string()
}

/// Language declared by the rule file at `path`, canonicalized.
/// `None` when the file is unreadable, not YAML or has no `language`.
pub fn rule_language(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read structural rule");
            return None;
        }
    };
    // Rule files may hold several documents; the first declaring a language wins.
    let language = serde_yaml_ng::Deserializer::from_str(&content)
        .filter_map(|doc| serde_yaml_ng::Value::deserialize(doc).ok())
        .find_map(|doc| doc.get("language").and_then(|l| l.as_str()).map(canonical_language));
    language
}

/// Extension patterns for a canonical language.
pub fn language_patterns(language: &str) -> Option<&'static [&'static str]> {
    LANGUAGES
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, patterns)| *patterns)
}
