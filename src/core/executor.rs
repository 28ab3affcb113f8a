//! Dispatcher: run one codemod against a target tree.
//!
//! resolve patterns → enumerate → (worker pool | whole-tree pass | script |
//! recipe) → file commands → observer
//!
//! Outside a recipe's virtual view, commands are applied to the real tree as
//! they are emitted unless the run is a dry run.

use super::commands;
use super::enumerate::{self, Matches};
use super::patterns::PatternResolver;
use super::pool::{PoolConfig, PoolInputs, PoolSink, WorkerPool};
use super::recipe;
use super::types::*;
use crate::engines::formatter::{ContentFormatter, NoopFormatter};
use crate::engines::{Arguments, ScriptInput, TransformEngine, TransformSource, TreeFile, TreeInput};
use crate::error::{RecastError, Result};
use crate::fs::real::RealFs;
use crate::fs::{ApplyOutcome, FileSystem, FsKind};
use crate::state::eventlog::{self, JournalEvent, JournalObserver};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runner-wide settings that outlive a single codemod.
#[derive(Clone)]
pub struct RunnerConfig {
    pub pool: PoolConfig,
    pub resolver: PatternResolver,
    /// Used when a run asks for formatted output.
    pub formatter: Option<Arc<dyn ContentFormatter>>,
    /// Where run journals go; `None` disables journaling.
    pub journal_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            resolver: PatternResolver::default(),
            formatter: None,
            journal_dir: None,
        }
    }
}

/// Runs codemods with one transform engine.
pub struct Runner {
    engine: Arc<dyn TransformEngine>,
    config: RunnerConfig,
}

/// Message for an empty match.
pub fn no_files_notice(codemod: &str) -> RunMessage {
    RunMessage::Notice {
        message: format!("No files found matching the patterns for codemod '{}'", codemod),
    }
}

/// Codemod arguments with run overrides applied on top.
fn merged_arguments(codemod: &Codemod, run: &RunSettings) -> Arguments {
    let mut args = codemod.arguments.clone();
    for (k, v) in &run.arguments {
        args.insert(k.clone(), v.clone());
    }
    args
}

/// Applies (when asked) and forwards pool output.
struct CommandSink<'a> {
    codemod: &'a str,
    fs: &'a dyn FileSystem,
    apply: bool,
    observer: &'a mut dyn RunObserver,
    emitted: usize,
    errors: usize,
}

impl<'a> CommandSink<'a> {
    fn new(codemod: &'a str, fs: &'a dyn FileSystem, apply: bool, observer: &'a mut dyn RunObserver) -> Self {
        Self {
            codemod,
            fs,
            apply,
            observer,
            emitted: 0,
            errors: 0,
        }
    }
}

impl PoolSink for CommandSink<'_> {
    fn progress(&mut self, state: &ProgressState) {
        self.observer.on_message(RunMessage::progress(self.codemod, state));
    }

    fn command(&mut self, command: FileCommand) {
        if self.apply {
            match self.fs.apply(&command) {
                Ok(ApplyOutcome::Applied) => {}
                Ok(ApplyOutcome::Ignored(reason)) => {
                    debug!(command = %command, %reason, "command ignored by filesystem view");
                    return;
                }
                Err(e) => {
                    self.errors += 1;
                    let path = command.path().to_path_buf();
                    self.observer
                        .on_message(RunMessage::file_error(self.codemod, &path, e));
                    return;
                }
            }
        }
        self.emitted += 1;
        self.observer.on_command(command);
    }

    fn file_error(&mut self, path: &Path, message: String) {
        self.errors += 1;
        self.observer
            .on_message(RunMessage::file_error(self.codemod, path, message));
    }
}

impl Runner {
    pub fn new(engine: Arc<dyn TransformEngine>, config: RunnerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `codemod` against `flow.target`.
    ///
    /// Configuration failures are returned as errors. Everything else
    /// (per-file failures, empty matches, idle timeouts) is reported through
    /// `observer` and the summary.
    pub async fn run(
        &self,
        codemod: &Codemod,
        flow: &FlowSettings,
        run: &RunSettings,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let mut run = run.clone();
        if run.run_id.is_empty() {
            run.run_id = eventlog::generate_run_id();
        }
        info!(
            run_id = %run.run_id,
            codemod = %codemod.name,
            engine = %codemod.engine,
            dry_run = run.dry_run,
            "starting run"
        );

        let fs: Arc<dyn FileSystem> = Arc::new(RealFs);
        let apply = !run.dry_run;

        let Some(dir) = self.config.journal_dir.clone() else {
            return self.dispatch(codemod, flow, &run, fs, apply, observer).await;
        };

        let mut journal = JournalObserver::new(observer, dir, &run.run_id);
        journal.record(JournalEvent::RunStarted {
            run_id: run.run_id.clone(),
            codemod: codemod.name.clone(),
            engine: codemod.engine.to_string(),
            target: flow.target.clone(),
            dry_run: run.dry_run,
            recast_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        let summary = self.dispatch(codemod, flow, &run, fs, apply, &mut journal).await?;
        journal.record_summary(&summary);
        Ok(summary)
    }

    /// Route a codemod to its execution strategy against `fs`.
    pub(crate) fn dispatch<'a>(
        &'a self,
        codemod: &'a Codemod,
        flow: &'a FlowSettings,
        run: &'a RunSettings,
        fs: Arc<dyn FileSystem>,
        apply: bool,
        observer: &'a mut dyn RunObserver,
    ) -> BoxFuture<'a, Result<RunSummary>> {
        let span = info_span!("dispatch", codemod = %codemod.name, engine = %codemod.engine);
        Box::pin(
            async move {
                let strategy = if codemod.is_recipe() {
                    Strategy::Recipe
                } else {
                    codemod.engine.strategy()
                };
                match strategy {
                    Strategy::Unsupported => Err(RecastError::UnsupportedEngine {
                        engine: codemod.engine.to_string(),
                    }),
                    Strategy::Recipe => recipe::run_recipe(self, codemod, flow, run, fs, apply, observer).await,
                    Strategy::DirectScript => self.run_script(codemod, flow, run, fs, apply, observer).await,
                    Strategy::WholeTree => self.run_whole_tree(codemod, flow, run, fs, apply, observer).await,
                    Strategy::PerFile => self.run_per_file(codemod, flow, run, fs, apply, observer).await,
                }
            }
            .instrument(span),
        )
    }

    fn formatter(&self, flow: &FlowSettings) -> Option<Arc<dyn ContentFormatter>> {
        if !flow.format {
            return None;
        }
        Some(
            self.config
                .formatter
                .clone()
                .unwrap_or_else(|| Arc::new(NoopFormatter)),
        )
    }

    fn preflight(&self, codemod: &Codemod) -> Result<Arc<TransformSource>> {
        self.engine
            .preflight(codemod.engine)
            .map_err(RecastError::Config)?;
        Ok(Arc::new(TransformSource::load(codemod)?))
    }

    async fn run_per_file(
        &self,
        codemod: &Codemod,
        flow: &FlowSettings,
        run: &RunSettings,
        fs: Arc<dyn FileSystem>,
        apply: bool,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let source = self.preflight(codemod)?;
        let set = self.config.resolver.resolve(flow, codemod);
        info!(reason = %set.reason, "resolved include patterns");

        let stream = match enumerate::enumerate_lazy(&set, &flow.target, fs.as_ref())? {
            Matches::Empty => {
                observer.on_message(no_files_notice(&codemod.name));
                return Ok(RunSummary {
                    no_files: true,
                    ..RunSummary::default()
                });
            }
            Matches::Found(stream) => stream,
        };

        let inputs = PoolInputs {
            codemod_name: codemod.name.clone(),
            engine_kind: codemod.engine,
            target: flow.target.clone(),
            engine: Arc::clone(&self.engine),
            source,
            arguments: Arc::new(merged_arguments(codemod, run)),
            formatter: self.formatter(flow),
        };
        let pool = WorkerPool::new(PoolConfig {
            workers: flow.workers.max(1),
            ..self.config.pool
        });

        let mut sink = CommandSink::new(&codemod.name, fs.as_ref(), apply, observer);
        let outcome = pool.run(stream, Arc::clone(&fs), inputs, &mut sink).await;

        Ok(RunSummary {
            commands: sink.emitted,
            processed_files: outcome.processed,
            total_files: outcome.total,
            errors: sink.errors,
            no_files: false,
            timed_out: outcome.timed_out,
        })
    }

    async fn run_whole_tree(
        &self,
        codemod: &Codemod,
        flow: &FlowSettings,
        run: &RunSettings,
        fs: Arc<dyn FileSystem>,
        apply: bool,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let source = self.preflight(codemod)?;
        let set = self.config.resolver.resolve(flow, codemod);
        info!(reason = %set.reason, "resolved include patterns");

        let paths = match enumerate::enumerate_eager(&set, &flow.target, fs.as_ref())? {
            Matches::Empty => {
                observer.on_message(no_files_notice(&codemod.name));
                return Ok(RunSummary {
                    no_files: true,
                    ..RunSummary::default()
                });
            }
            Matches::Found(paths) => paths,
        };

        let total = paths.len() as u64;
        let mut sink = CommandSink::new(&codemod.name, fs.as_ref(), apply, observer);
        let mut files = Vec::with_capacity(paths.len());
        for (path, content) in crate::fs::read_all(&fs, paths)
            .await
            .map_err(RecastError::Engine)?
        {
            match content {
                Ok(content) => files.push(TreeFile { path, content }),
                Err(e) => sink.file_error(&path, e),
            }
        }

        let input = TreeInput {
            root: flow.target.clone(),
            files,
            source,
            arguments: Arc::new(merged_arguments(codemod, run)),
        };
        let edits = match self.engine.transform_tree(&input).await {
            Ok(edits) => edits,
            Err(e) => {
                sink.errors += 1;
                sink.observer.on_message(RunMessage::Error {
                    message: e,
                    codemod_name: Some(codemod.name.clone()),
                    path: None,
                });
                Vec::new()
            }
        };

        let formatter = self.formatter(flow);
        for command in commands::from_tree_edits(edits, &flow.target, fs.as_ref()) {
            let command = match formatter.as_deref() {
                Some(f) => commands::format_command(command, f).await,
                None => command,
            };
            sink.command(command);
        }
        sink.progress(&ProgressState {
            processed: total,
            total,
            current_file: None,
        });

        Ok(RunSummary {
            commands: sink.emitted,
            processed_files: total,
            total_files: total,
            errors: sink.errors,
            no_files: false,
            timed_out: false,
        })
    }

    async fn run_script(
        &self,
        codemod: &Codemod,
        flow: &FlowSettings,
        run: &RunSettings,
        fs: Arc<dyn FileSystem>,
        apply: bool,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let source = self.preflight(codemod)?;
        if !apply || fs.kind() == FsKind::Virtual {
            observer.on_message(RunMessage::Notice {
                message: format!(
                    "Skipping script codemod '{}': scripts cannot be previewed in a dry run",
                    codemod.name
                ),
            });
            return Ok(RunSummary::default());
        }

        let input = ScriptInput {
            target: flow.target.clone(),
            source,
            arguments: Arc::new(merged_arguments(codemod, run)),
        };
        match self.engine.run_script(&input).await {
            Ok(()) => Ok(RunSummary::default()),
            Err(e) => {
                warn!(error = %e, "script codemod failed");
                observer.on_message(RunMessage::Error {
                    message: e,
                    codemod_name: Some(codemod.name.clone()),
                    path: None,
                });
                Ok(RunSummary {
                    errors: 1,
                    ..RunSummary::default()
                })
            }
        }
    }
}
