//! Recipe orchestration: run nested codemods strictly in order.
//!
//! Dry runs seed an in-memory view from the recipe's matched files, run
//! every step against it with edits applied in place, and emit only the net
//! diff between the seeded and final snapshots. Direct runs apply each
//! step's commands to disk before the next step starts.
//!
//! Nested steps report through a [`StepObserver`]: errors are forwarded
//! with the step's name (`recipe/step` style for deeper nesting), progress
//! is renumbered onto one recipe-wide scale and notices are dropped.

use super::enumerate::{self, Matches};
use super::executor::{no_files_notice, Runner};
use super::types::*;
use crate::error::{RecastError, Result};
use crate::fs::memory::MemoryFs;
use crate::fs::{FileSystem, FsKind};
use crate::state::{hasher, snapshot};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Maps per-step progress onto one combined scale.
///
/// A step's file count is only trusted once the step finishes; the pool
/// discovers its total while it walks. Running steps, and every step still
/// to come, are estimated at the last finished step's count, or at the
/// running step's own count when it is larger.
#[derive(Debug, Clone)]
pub struct RecipeProgress {
    step_count: usize,
    finished: Vec<Option<u64>>,
}

impl RecipeProgress {
    pub fn new(step_count: usize) -> Self {
        Self {
            step_count,
            finished: vec![None; step_count],
        }
    }

    /// Record the final file count of step `step`.
    pub fn finish(&mut self, step: usize, total: u64) {
        if let Some(slot) = self.finished.get_mut(step) {
            *slot = Some(total);
        }
    }

    /// Combined `(processed, total)` for step `step` reporting
    /// `(processed, total)`.
    pub fn combine(&self, step: usize, processed: u64, total: u64) -> (u64, u64) {
        let earlier = &self.finished[..step.min(self.finished.len())];
        let done: u64 = earlier.iter().flatten().sum();
        let estimate = earlier
            .iter()
            .rev()
            .flatten()
            .next()
            .map_or(total, |last| total.max(*last));
        let remaining = self.step_count.saturating_sub(step).max(1) as u64;
        (done + processed, done + estimate * remaining)
    }
}

/// Wraps the recipe's observer while one step runs.
pub struct StepObserver<'a> {
    inner: &'a mut dyn RunObserver,
    recipe: &'a str,
    step: &'a str,
    index: usize,
    progress: &'a RecipeProgress,
    forward_commands: bool,
}

impl StepObserver<'_> {
    fn label(&self, origin: Option<String>) -> String {
        match origin {
            Some(name) if name != self.step => format!("{}/{}", self.step, name),
            _ => self.step.to_string(),
        }
    }
}

impl RunObserver for StepObserver<'_> {
    fn on_message(&mut self, message: RunMessage) {
        match message {
            RunMessage::Progress {
                processed_file_number,
                total_file_number,
                processed_file_name,
                ..
            } => {
                let (processed, total) =
                    self.progress
                        .combine(self.index, processed_file_number, total_file_number);
                self.inner.on_message(RunMessage::Progress {
                    codemod_name: Some(self.recipe.to_string()),
                    processed_file_number: processed,
                    total_file_number: total,
                    processed_file_name,
                });
            }
            RunMessage::Error {
                message,
                codemod_name,
                path,
            } => {
                let codemod_name = Some(self.label(codemod_name));
                self.inner.on_message(RunMessage::Error {
                    message,
                    codemod_name,
                    path,
                });
            }
            RunMessage::Notice { message } => {
                debug!(step = self.step, %message, "suppressing nested notice");
            }
        }
    }

    fn on_command(&mut self, command: FileCommand) {
        if self.forward_commands {
            self.inner.on_command(command);
        }
    }
}

/// Run a recipe. Dry runs against the real tree go through a virtual view;
/// everything else runs steps directly against `fs`.
#[instrument(skip_all, fields(recipe = %codemod.name, steps = codemod.steps.len()))]
pub(crate) async fn run_recipe(
    runner: &Runner,
    codemod: &Codemod,
    flow: &FlowSettings,
    run: &RunSettings,
    fs: Arc<dyn FileSystem>,
    apply: bool,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary> {
    if codemod.steps.is_empty() {
        return Err(RecastError::Config(format!(
            "recipe '{}' has no steps",
            codemod.name
        )));
    }

    if !apply && fs.kind() == FsKind::Real {
        return run_virtual(runner, codemod, flow, run, fs, observer).await;
    }
    run_steps(runner, codemod, flow, run, fs, true, observer).await
}

async fn run_virtual(
    runner: &Runner,
    codemod: &Codemod,
    flow: &FlowSettings,
    run: &RunSettings,
    real: Arc<dyn FileSystem>,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary> {
    let set = runner.config().resolver.resolve(flow, codemod);
    let paths = match enumerate::enumerate_eager(&set, &flow.target, real.as_ref())? {
        Matches::Empty => {
            observer.on_message(no_files_notice(&codemod.name));
            return Ok(RunSummary {
                no_files: true,
                ..RunSummary::default()
            });
        }
        Matches::Found(paths) => paths,
    };

    let view = Arc::new(MemoryFs::seed(real.as_ref(), paths));
    let original = view.snapshot();
    info!(recipe = %codemod.name, files = original.len(), "seeded virtual view for dry run");

    let virtual_fs: Arc<dyn FileSystem> = view.clone();
    let mut summary = run_steps(runner, codemod, flow, run, virtual_fs, false, observer).await?;

    let current = view.snapshot();
    let (before, after) = (hasher::hash_snapshot(&original), hasher::hash_snapshot(&current));
    if before == after {
        debug!(hash = %after, "virtual view unchanged");
        summary.commands = 0;
        return Ok(summary);
    }

    let diff = snapshot::net_diff(&original, &current);
    let counts = snapshot::count(&original, &diff);
    info!(
        created = counts.created,
        updated = counts.updated,
        deleted = counts.deleted,
        unchanged = counts.unchanged,
        "recipe net diff"
    );
    summary.commands = diff.len();
    for command in diff {
        observer.on_command(command);
    }
    Ok(summary)
}

async fn run_steps(
    runner: &Runner,
    codemod: &Codemod,
    flow: &FlowSettings,
    run: &RunSettings,
    fs: Arc<dyn FileSystem>,
    forward_commands: bool,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary> {
    let mut progress = RecipeProgress::new(codemod.steps.len());
    let mut summary = RunSummary::default();

    for (index, step) in codemod.steps.iter().enumerate() {
        if fs.kind() == FsKind::Virtual
            && !step.is_recipe()
            && step.engine.strategy() == Strategy::DirectScript
        {
            observer.on_message(RunMessage::Notice {
                message: format!(
                    "Skipping step '{}' of recipe '{}': script codemods cannot run in a dry run",
                    step.name, codemod.name
                ),
            });
            continue;
        }

        info!(recipe = %codemod.name, step = %step.name, index, "running recipe step");
        let mut nested = StepObserver {
            inner: &mut *observer,
            recipe: &codemod.name,
            step: &step.name,
            index,
            progress: &progress,
            forward_commands,
        };
        let step_summary = runner
            .dispatch(step, flow, run, Arc::clone(&fs), true, &mut nested)
            .await?;
        progress.finish(index, step_summary.total_files);
        summary.absorb(&step_summary);
    }

    if !forward_commands {
        summary.commands = 0;
    }
    Ok(summary)
}
