//! CLI subcommands: init, validate, patterns, run, schema, completions.

use crate::core::config::RecastConfig;
use crate::core::enumerate::{self, Matches};
use crate::core::executor::Runner;
use crate::core::parser;
use crate::core::types::{
    Codemod, FileCommand, FlowSettings, RunMessage, RunObserver, RunSettings, RunSummary,
};
use crate::fs::real::RealFs;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "recast",
    version,
    about = "Codemod orchestration: select files, run transforms, preview or apply file edits"
)]
pub struct Cli {
    /// Increase diagnostic output (-v info, -vv debug); RECAST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold a codemod descriptor and transform script
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a codemod descriptor
    Validate {
        /// Path to codemod.yaml
        #[arg(short, long, default_value = "codemod.yaml")]
        file: PathBuf,
    },

    /// Show the resolved include/exclude patterns and how many files match
    Patterns {
        #[command(flatten)]
        selection: Selection,
    },

    /// Run a codemod against a target directory
    Run(RunArgs),

    /// Print the codemod descriptor JSON Schema
    Schema,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Descriptor, target and file selection shared by `patterns` and `run`.
#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// Path to codemod.yaml
    #[arg(short, long, default_value = "codemod.yaml")]
    pub file: PathBuf,

    /// Target directory
    #[arg(long, default_value = ".")]
    pub target: PathBuf,

    /// Include pattern (repeatable); overrides the codemod's patterns
    #[arg(long)]
    pub include: Vec<String>,

    /// Exclude pattern (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Explicit file to process (repeatable); disables pattern matching
    #[arg(long = "path")]
    pub paths: Vec<PathBuf>,

    /// Runtime config (default: <target>/recast.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Preview edits without touching the target
    #[arg(long)]
    pub dry_run: bool,

    /// Worker pool size (default: from config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run created and updated files through the configured formatter
    #[arg(long)]
    pub format: bool,

    /// Print commands and messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Run identifier for the journal (default: generated)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Transform argument override, `key=value` (repeatable)
    #[arg(long = "arg", value_parser = parse_argument)]
    pub arguments: Vec<(String, serde_json::Value)>,
}

/// Parse `key=value`. JSON values are kept typed, anything else is a string.
fn parse_argument(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty argument name in '{}'", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Patterns { selection } => cmd_patterns(&selection),
        Commands::Run(args) => cmd_run(&args, &mut std::io::stdout()).await,
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "recast", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let descriptor = path.join("codemod.yaml");
    if descriptor.exists() {
        return Err(format!("{} already exists", descriptor.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let name = path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|n| parser::validate_codemod(&placeholder(n)).is_empty())
        .unwrap_or_else(|| "my-codemod".to_string());

    let template = format!(
        r#"name: {name}
engine: text
transform: transform.sh
include:
  - "**/*.txt"
arguments:
  from: foo
  to: bar
"#
    );
    let script = r#"#!/usr/bin/env bash
# Content arrives on stdin; print the new content. $1 is the file path.
# Arguments are a JSON object in $RECAST_ARGS.
set -euo pipefail
sed 's/foo/bar/g'
"#;
    let transform = path.join("transform.sh");
    std::fs::write(&descriptor, template)
        .map_err(|e| format!("cannot write {}: {}", descriptor.display(), e))?;
    std::fs::write(&transform, script)
        .map_err(|e| format!("cannot write {}: {}", transform.display(), e))?;

    println!("Initialized codemod at {}", path.display());
    println!("  Created: {}", descriptor.display());
    println!("  Created: {}", transform.display());
    Ok(())
}

fn placeholder(name: &str) -> Codemod {
    Codemod {
        name: name.to_string(),
        engine: crate::core::types::EngineKind::Text,
        transform: Some(PathBuf::from("transform.sh")),
        include: vec![],
        arguments: Default::default(),
        steps: vec![],
        source: Default::default(),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let codemod = parser::load_codemod(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_codemod(&codemod);

    if errors.is_empty() {
        println!(
            "OK: {} ({}, {} step(s), source {})",
            codemod.name,
            codemod.engine,
            codemod.steps.len(),
            codemod.source
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_schema() -> Result<(), String> {
    let schema = serde_json::to_string_pretty(&parser::codemod_schema())
        .map_err(|e| format!("cannot encode schema: {}", e))?;
    println!("{}", schema);
    Ok(())
}

/// Load and validate the descriptor, then build flow settings for it.
fn prepare(selection: &Selection) -> Result<(Codemod, RecastConfig, FlowSettings), String> {
    let codemod = parser::load_codemod(&selection.file).map_err(|e| e.to_string())?;
    let errors = parser::validate_codemod(&codemod);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let target = std::path::absolute(&selection.target)
        .map_err(|e| format!("cannot resolve {}: {}", selection.target.display(), e))?;
    if !target.is_dir() {
        return Err(format!("target {} is not a directory", target.display()));
    }
    let config =
        RecastConfig::discover(selection.config.as_deref(), &target).map_err(|e| e.to_string())?;

    let files = if selection.paths.is_empty() {
        None
    } else {
        let mut files = Vec::with_capacity(selection.paths.len());
        for p in &selection.paths {
            files.push(
                std::path::absolute(p).map_err(|e| format!("cannot resolve {}: {}", p.display(), e))?,
            );
        }
        Some(files)
    };

    let flow = FlowSettings {
        target,
        include: selection.include.clone(),
        exclude: selection.exclude.clone(),
        files,
        workers: config.workers,
        format: false,
    };
    Ok((codemod, config, flow))
}

fn cmd_patterns(selection: &Selection) -> Result<(), String> {
    let (codemod, config, flow) = prepare(selection)?;
    let set = config.runner_config().resolver.resolve(&flow, &codemod);

    println!("Reason: {}", set.reason);
    println!("Include:");
    for p in &set.include {
        println!("  + {}", p);
    }
    println!("Exclude:");
    for p in &set.exclude {
        println!("  - {}", p);
    }
    let matched = match enumerate::enumerate_eager(&set, &flow.target, &RealFs)
        .map_err(|e| e.to_string())?
    {
        Matches::Empty => 0,
        Matches::Found(paths) => paths.len(),
    };
    println!("Matched: {} file(s)", matched);
    Ok(())
}

async fn cmd_run(args: &RunArgs, out: &mut (dyn Write + Send)) -> Result<(), String> {
    let (codemod, config, mut flow) = prepare(&args.selection)?;
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("--workers must be at least 1".to_string());
        }
        flow.workers = workers;
    }
    flow.format = args.format;

    let run = RunSettings {
        dry_run: args.dry_run,
        run_id: args.run_id.clone().unwrap_or_default(),
        arguments: args.arguments.iter().cloned().collect(),
    };

    let runner = Runner::new(Arc::new(config.engine()), config.runner_config());
    let mut observer = CliObserver::new(out, args.json);
    let summary = runner
        .run(&codemod, &flow, &run, &mut observer)
        .await
        .map_err(|e| e.to_string())?;
    observer.finish();

    eprintln!("{}", summary_line(&summary, args.dry_run));
    if summary.errors > 0 {
        return Err(format!("{} error(s) during run", summary.errors));
    }
    Ok(())
}

fn summary_line(summary: &RunSummary, dry_run: bool) -> String {
    if summary.no_files {
        return "Nothing to do: no files matched.".to_string();
    }
    let mut line = format!(
        "{}: {} command(s), {}/{} file(s) processed, {} error(s)",
        if dry_run { "Dry run complete" } else { "Run complete" },
        summary.commands,
        summary.processed_files,
        summary.total_files,
        summary.errors
    );
    if summary.timed_out {
        line.push_str(" (stopped after idle timeout)");
    }
    line
}

/// Prints commands to `out`; messages go to stderr unless `json` is set,
/// in which case everything is a JSON line on `out`.
struct CliObserver<'a> {
    out: &'a mut (dyn Write + Send),
    json: bool,
    progress_shown: bool,
}

impl<'a> CliObserver<'a> {
    fn new(out: &'a mut (dyn Write + Send), json: bool) -> Self {
        Self {
            out,
            json,
            progress_shown: false,
        }
    }

    fn json_line<T: serde::Serialize>(&mut self, value: &T) {
        match serde_json::to_string(value) {
            Ok(line) => {
                let _ = writeln!(self.out, "{}", line);
            }
            Err(e) => eprintln!("  ERROR: cannot encode output: {}", e),
        }
    }

    fn end_progress(&mut self) {
        if self.progress_shown {
            eprintln!();
            self.progress_shown = false;
        }
    }

    fn finish(&mut self) {
        self.end_progress();
        let _ = self.out.flush();
    }
}

impl RunObserver for CliObserver<'_> {
    fn on_message(&mut self, message: RunMessage) {
        if self.json {
            self.json_line(&message);
            return;
        }
        match message {
            RunMessage::Progress {
                processed_file_number,
                total_file_number,
                ..
            } => {
                eprint!("\r  [{}/{}]", processed_file_number, total_file_number);
                self.progress_shown = true;
            }
            RunMessage::Error {
                message,
                codemod_name,
                path,
            } => {
                self.end_progress();
                let origin = match (codemod_name, path) {
                    (Some(c), Some(p)) => format!("{} {}: ", c, p.display()),
                    (Some(c), None) => format!("{}: ", c),
                    (None, Some(p)) => format!("{}: ", p.display()),
                    (None, None) => String::new(),
                };
                eprintln!("  ERROR: {}{}", origin, message);
            }
            RunMessage::Notice { message } => {
                self.end_progress();
                eprintln!("  NOTE: {}", message);
            }
        }
    }

    fn on_command(&mut self, command: FileCommand) {
        if self.json {
            self.json_line(&command);
        } else {
            let _ = writeln!(self.out, "{}", command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(dir: &Path) -> PathBuf {
        let target = dir.join("repo");
        std::fs::create_dir_all(target.join("src")).unwrap();
        std::fs::write(target.join("src/a.txt"), "foo foo\n").unwrap();
        std::fs::write(target.join("src/b.md"), "foo\n").unwrap();
        cmd_init(&dir.join("mod")).unwrap();
        target
    }

    fn run_args(dir: &Path, target: &Path) -> RunArgs {
        RunArgs {
            selection: Selection {
                file: dir.join("mod/codemod.yaml"),
                target: target.to_path_buf(),
                include: vec![],
                exclude: vec![],
                paths: vec![],
                config: None,
            },
            dry_run: false,
            workers: Some(2),
            format: false,
            json: false,
            run_id: None,
            arguments: vec![],
        }
    }

    #[test]
    fn test_cli_init_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("rename-foo");
        cmd_init(&sub).unwrap();
        assert!(sub.join("codemod.yaml").exists());
        assert!(sub.join("transform.sh").exists());
        let yaml = std::fs::read_to_string(sub.join("codemod.yaml")).unwrap();
        assert!(yaml.starts_with("name: rename-foo"));
        cmd_validate(&sub.join("codemod.yaml")).unwrap();
    }

    #[test]
    fn test_cli_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("codemod.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_cli_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("codemod.yaml");
        std::fs::write(&file, "name: \"\"\nengine: recipe\n").unwrap();
        assert!(cmd_validate(&file).is_err());
    }

    #[test]
    fn test_cli_parse_argument() {
        assert_eq!(
            parse_argument("to=lodash-es").unwrap(),
            ("to".to_string(), serde_json::json!("lodash-es"))
        );
        assert_eq!(
            parse_argument("depth=3").unwrap(),
            ("depth".to_string(), serde_json::json!(3))
        );
        assert!(parse_argument("novalue").is_err());
        assert!(parse_argument("=x").is_err());
    }

    #[test]
    fn test_cli_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let target = project(dir.path());
        cmd_patterns(&run_args(dir.path(), &target).selection).unwrap();
    }

    #[tokio::test]
    async fn test_cli_run_dry_run_json() {
        let dir = tempfile::tempdir().unwrap();
        let target = project(dir.path());
        let mut args = run_args(dir.path(), &target);
        args.dry_run = true;
        args.json = true;

        let mut out = Vec::new();
        cmd_run(&args, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let commands: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .filter(|v: &serde_json::Value| v["kind"] == "updateFile")
            .collect();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["newContent"], "bar bar\n");
        assert_eq!(
            std::fs::read_to_string(target.join("src/a.txt")).unwrap(),
            "foo foo\n"
        );
    }

    #[tokio::test]
    async fn test_cli_run_applies() {
        let dir = tempfile::tempdir().unwrap();
        let target = project(dir.path());
        let mut out = Vec::new();
        cmd_run(&run_args(dir.path(), &target), &mut out).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(target.join("src/a.txt")).unwrap(),
            "bar bar\n"
        );
        assert_eq!(std::fs::read_to_string(target.join("src/b.md")).unwrap(), "foo\n");
        assert!(String::from_utf8(out).unwrap().starts_with("~ "));
    }

    #[tokio::test]
    async fn test_cli_run_transform_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = project(dir.path());
        std::fs::write(dir.path().join("mod/transform.sh"), "exit 2\n").unwrap();
        let mut out = Vec::new();
        let err = cmd_run(&run_args(dir.path(), &target), &mut out).await.unwrap_err();
        assert!(err.contains("1 error"));
    }

    #[tokio::test]
    async fn test_cli_run_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let target = project(dir.path());
        let mut args = run_args(dir.path(), &target);
        args.workers = Some(0);
        assert!(cmd_run(&args, &mut Vec::new()).await.is_err());
    }

    #[test]
    fn test_cli_summary_line() {
        let summary = RunSummary {
            commands: 2,
            processed_files: 3,
            total_files: 3,
            timed_out: true,
            ..RunSummary::default()
        };
        let line = summary_line(&summary, true);
        assert!(line.starts_with("Dry run complete: 2 command(s), 3/3"));
        assert!(line.ends_with("(stopped after idle timeout)"));
        assert!(summary_line(
            &RunSummary {
                no_files: true,
                ..RunSummary::default()
            },
            false
        )
        .contains("no files"));
    }

    #[tokio::test]
    async fn test_cli_dispatch_schema_and_validate() {
        dispatch(Commands::Schema).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        dispatch(Commands::Validate {
            file: dir.path().join("codemod.yaml"),
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
