//! Fixed-size worker pool for per-file transforms.
//!
//! The coordinator owns the lazy path stream and hands one path at a time
//! to an idle worker over that worker's own channel. The worker reads the
//! file through the run's filesystem view, transforms it and reports back on
//! a shared result channel. Progress is counted only by the coordinator.
//!
//! An idle timer is armed when the pool is built and reset on every result.
//! If it fires before the stream drains, every worker is aborted and the run
//! resolves as complete with `timed_out` set.

use super::commands;
use super::enumerate::PathStream;
use super::types::{EngineKind, FileCommand, ProgressState};
use crate::engines::formatter::ContentFormatter;
use crate::engines::{Arguments, TransformEngine, TransformSource, WorkerTask};
use crate::fs::FileSystem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, instrument, warn};

/// Default idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Static inputs shared by every task of a run.
#[derive(Clone)]
pub struct PoolInputs {
    pub codemod_name: String,
    pub engine_kind: EngineKind,
    pub target: PathBuf,
    pub engine: Arc<dyn TransformEngine>,
    pub source: Arc<TransformSource>,
    pub arguments: Arc<Arguments>,
    pub formatter: Option<Arc<dyn ContentFormatter>>,
}

/// Receives pool output on the coordinating task.
pub trait PoolSink: Send {
    fn progress(&mut self, state: &ProgressState);
    fn command(&mut self, command: FileCommand);
    fn file_error(&mut self, path: &Path, message: String);
}

/// What a pool run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    pub processed: u64,
    pub total: u64,
    pub commands: usize,
    pub errors: usize,
    pub timed_out: bool,
}

enum WorkerMessage {
    Completed {
        worker: usize,
        path: PathBuf,
        command: Option<FileCommand>,
    },
    Failed {
        worker: usize,
        path: PathBuf,
        error: String,
    },
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn worker_loop(
    id: usize,
    mut paths: mpsc::Receiver<PathBuf>,
    results: mpsc::Sender<WorkerMessage>,
    fs: Arc<dyn FileSystem>,
    inputs: Arc<PoolInputs>,
) {
    while let Some(path) = paths.recv().await {
        let message = match crate::fs::read_async(&fs, &path).await {
            Ok(content) => {
                let task = WorkerTask {
                    engine: inputs.engine_kind,
                    target: inputs.target.clone(),
                    path,
                    content,
                    source: Arc::clone(&inputs.source),
                    arguments: Arc::clone(&inputs.arguments),
                };
                transform(id, task, &inputs).await
            }
            Err(error) => WorkerMessage::Failed {
                worker: id,
                path,
                error,
            },
        };
        if results.send(message).await.is_err() {
            break;
        }
    }
}

async fn transform(id: usize, task: WorkerTask, inputs: &PoolInputs) -> WorkerMessage {
    let path = task.path.clone();
    let old = task.content.clone();

    // The transform runs in its own task so a panic becomes a per-file error.
    let engine = Arc::clone(&inputs.engine);
    let mut running = AbortOnDrop(tokio::spawn(async move { engine.transform_file(&task).await }));
    match (&mut running.0).await {
        Ok(Ok(new)) => {
            let command = match (commands::from_file_output(&path, &old, new), inputs.formatter.as_deref()) {
                (Some(cmd), Some(fmt)) => Some(commands::format_command(cmd, fmt).await),
                (command, _) => command,
            };
            WorkerMessage::Completed {
                worker: id,
                path,
                command,
            }
        }
        Ok(Err(error)) => WorkerMessage::Failed {
            worker: id,
            path,
            error,
        },
        Err(join) => WorkerMessage::Failed {
            worker: id,
            path,
            error: format!("transform panicked: {}", join),
        },
    }
}

/// Count a file that never produced a result as processed with an error.
fn record_failure(
    path: PathBuf,
    error: String,
    progress: &mut ProgressState,
    outcome: &mut PoolOutcome,
    sink: &mut dyn PoolSink,
) {
    outcome.errors += 1;
    sink.file_error(&path, error);
    progress.processed += 1;
    progress.current_file = Some(path);
    sink.progress(progress);
}

/// Send `path` to a worker. When the worker's channel has closed the file is
/// counted as failed and `false` is returned.
async fn hand_off(
    sender: &mpsc::Sender<PathBuf>,
    worker: usize,
    path: PathBuf,
    progress: &mut ProgressState,
    outcome: &mut PoolOutcome,
    sink: &mut dyn PoolSink,
) -> bool {
    match sender.send(path).await {
        Ok(()) => true,
        Err(mpsc::error::SendError(path)) => {
            warn!(worker, path = %path.display(), "worker channel closed");
            record_failure(
                path,
                format!("worker {} exited before accepting the file", worker),
                progress,
                outcome,
                sink,
            );
            false
        }
    }
}

/// One pool instance per run. Owns its idle timer.
pub struct WorkerPool {
    config: PoolConfig,
    idle: Pin<Box<Sleep>>,
}

impl WorkerPool {
    /// Build the pool and arm the idle timer.
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig {
            workers: config.workers.max(1),
            ..config
        };
        Self {
            idle: Box::pin(sleep(config.idle_timeout)),
            config,
        }
    }

    fn reset_idle(&mut self) {
        let deadline = Instant::now() + self.config.idle_timeout;
        self.idle.as_mut().reset(deadline);
    }

    /// Drive `paths` through the pool until the stream drains or the idle
    /// timer fires.
    #[instrument(skip_all, fields(codemod = %inputs.codemod_name, workers = self.config.workers))]
    pub async fn run(
        mut self,
        mut paths: PathStream,
        fs: Arc<dyn FileSystem>,
        inputs: PoolInputs,
        sink: &mut dyn PoolSink,
    ) -> PoolOutcome {
        let (result_tx, mut result_rx) = mpsc::channel(self.config.workers * 2);
        let inputs = Arc::new(inputs);
        let mut senders = Vec::with_capacity(self.config.workers);
        let mut handles = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let (tx, rx) = mpsc::channel(1);
            senders.push(tx);
            handles.push(tokio::spawn(worker_loop(
                id,
                rx,
                result_tx.clone(),
                Arc::clone(&fs),
                Arc::clone(&inputs),
            )));
        }
        drop(result_tx);

        let mut idle_workers: Vec<usize> = (0..self.config.workers).rev().collect();
        let mut progress = ProgressState::default();
        let mut outcome = PoolOutcome::default();
        let mut in_flight = 0usize;
        let mut exhausted = false;

        loop {
            while !exhausted {
                let Some(worker) = idle_workers.pop() else {
                    break;
                };
                match paths.next() {
                    Some(path) => {
                        progress.total += 1;
                        if hand_off(&senders[worker], worker, path, &mut progress, &mut outcome, sink).await {
                            in_flight += 1;
                        }
                    }
                    None => {
                        idle_workers.push(worker);
                        exhausted = true;
                    }
                }
            }

            if exhausted && in_flight == 0 {
                debug!(processed = progress.processed, "all files processed");
                break;
            }

            tokio::select! {
                message = result_rx.recv() => {
                    let Some(message) = message else {
                        warn!("all workers exited early");
                        break;
                    };
                    self.reset_idle();
                    in_flight -= 1;
                    match message {
                        WorkerMessage::Completed { worker, path, command } => {
                            if let Some(command) = command {
                                outcome.commands += 1;
                                sink.command(command);
                            }
                            idle_workers.push(worker);
                            progress.processed += 1;
                            progress.current_file = Some(path);
                            sink.progress(&progress);
                        }
                        WorkerMessage::Failed { worker, path, error } => {
                            idle_workers.push(worker);
                            record_failure(path, error, &mut progress, &mut outcome, sink);
                        }
                    }
                }
                () = &mut self.idle => {
                    warn!(
                        timeout_secs = self.config.idle_timeout.as_secs(),
                        in_flight,
                        "no worker activity before idle timeout; terminating pool"
                    );
                    outcome.timed_out = true;
                    break;
                }
            }
        }

        drop(senders);
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        outcome.processed = progress.processed;
        outcome.total = progress.total;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::ScriptedEngine;
    use crate::engines::{ScriptInput, TreeEdit, TreeInput};
    use crate::fs::memory::MemoryFs;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        progress: Vec<(u64, u64)>,
        commands: Vec<FileCommand>,
        errors: Vec<(PathBuf, String)>,
    }

    impl PoolSink for Recorder {
        fn progress(&mut self, state: &ProgressState) {
            self.progress.push((state.processed, state.total));
        }
        fn command(&mut self, command: FileCommand) {
            self.commands.push(command);
        }
        fn file_error(&mut self, path: &Path, message: String) {
            self.errors.push((path.to_path_buf(), message));
        }
    }

    fn memory(n: usize) -> (Arc<MemoryFs>, Vec<PathBuf>) {
        let files: Vec<(PathBuf, String)> = (0..n)
            .map(|i| (PathBuf::from(format!("/r/f{i}.txt")), format!("file {i}")))
            .collect();
        let paths = files.iter().map(|(p, _)| p.clone()).collect();
        (Arc::new(MemoryFs::from_files(files)), paths)
    }

    fn inputs(engine: Arc<dyn TransformEngine>) -> PoolInputs {
        PoolInputs {
            codemod_name: "demo".into(),
            engine_kind: EngineKind::Text,
            target: "/r".into(),
            engine,
            source: Arc::new(TransformSource::inline("t.sh", "")),
            arguments: Arc::new(Arguments::new()),
            formatter: None,
        }
    }

    fn upper() -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine::per_file(|t| {
            if t.path.ends_with("f3.txt") {
                Err("syntax error".into())
            } else if t.path.ends_with("f0.txt") {
                Ok(None)
            } else {
                Ok(Some(t.content.to_uppercase()))
            }
        }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_processes_every_file_once() {
        let (fs, paths) = memory(20);
        let engine = upper();
        let mut rec = Recorder::default();
        let pool = WorkerPool::new(PoolConfig {
            workers: 4,
            ..PoolConfig::default()
        });
        let out = pool
            .run(PathStream::from_paths(paths), fs, inputs(engine.clone()), &mut rec)
            .await;

        assert_eq!(out.processed, 20);
        assert_eq!(out.total, 20);
        assert_eq!(out.errors, 1);
        assert_eq!(out.commands, 18);
        assert!(!out.timed_out);
        assert_eq!(engine.file_calls.load(Ordering::SeqCst), 20);

        let mut seen = engine.seen.lock().unwrap().clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[tokio::test]
    async fn test_pool_progress_is_monotonic() {
        let (fs, paths) = memory(6);
        let mut rec = Recorder::default();
        WorkerPool::new(PoolConfig {
            workers: 3,
            ..PoolConfig::default()
        })
        .run(PathStream::from_paths(paths), fs, inputs(upper()), &mut rec)
        .await;

        let processed: Vec<u64> = rec.progress.iter().map(|(p, _)| *p).collect();
        assert_eq!(processed, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(rec.progress.last(), Some(&(6, 6)));
        assert!(rec.progress.iter().all(|(p, t)| p <= t));
    }

    #[tokio::test]
    async fn test_pool_file_error_is_not_fatal() {
        let (fs, paths) = memory(5);
        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig::default())
            .run(PathStream::from_paths(paths), fs, inputs(upper()), &mut rec)
            .await;
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.errors[0].0, PathBuf::from("/r/f3.txt"));
        assert!(rec.errors[0].1.contains("syntax error"));
        assert_eq!(out.processed, 5);
    }

    #[tokio::test]
    async fn test_pool_unreadable_file_reported() {
        let (fs, mut paths) = memory(2);
        paths.push(PathBuf::from("/r/vanished.txt"));
        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig::default())
            .run(PathStream::from_paths(paths), fs, inputs(upper()), &mut rec)
            .await;
        assert_eq!(out.processed, 3);
        assert_eq!(out.errors, 1);
        assert_eq!(rec.errors[0].0, PathBuf::from("/r/vanished.txt"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_reads_real_files_in_workers() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("f{i}.txt"));
                std::fs::write(&path, format!("file {i}")).unwrap();
                path
            })
            .collect();
        let mut listed = paths.clone();
        listed.push(dir.path().join("vanished.txt"));

        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig {
            workers: 2,
            ..PoolConfig::default()
        })
        .run(
            PathStream::from_paths(listed),
            Arc::new(crate::fs::real::RealFs),
            inputs(upper()),
            &mut rec,
        )
        .await;

        assert_eq!(out.processed, 6);
        assert_eq!(out.total, 6);
        assert_eq!(out.errors, 2);
        assert_eq!(out.commands, 3);
        assert!(rec.errors.iter().any(|(p, _)| p.ends_with("vanished.txt")));
        assert_eq!(rec.progress.last(), Some(&(6, 6)));
    }

    #[tokio::test]
    async fn test_pool_closed_worker_counts_file() {
        let (tx, rx) = mpsc::channel::<PathBuf>(1);
        drop(rx);
        let mut progress = ProgressState {
            total: 1,
            ..ProgressState::default()
        };
        let mut outcome = PoolOutcome::default();
        let mut rec = Recorder::default();

        let sent = hand_off(&tx, 0, "/r/a.txt".into(), &mut progress, &mut outcome, &mut rec).await;

        assert!(!sent);
        assert_eq!(outcome.errors, 1);
        assert_eq!(progress.processed, 1);
        assert_eq!(rec.errors[0].0, PathBuf::from("/r/a.txt"));
        assert!(rec.errors[0].1.contains("exited"));
        assert_eq!(rec.progress, vec![(1, 1)]);
    }

    #[tokio::test]
    async fn test_pool_panicking_transform_becomes_error() {
        let (fs, paths) = memory(3);
        let engine = Arc::new(ScriptedEngine::per_file(|t| {
            if t.path.ends_with("f1.txt") {
                panic!("transform bug");
            }
            Ok(Some("x".into()))
        }));
        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig::default())
            .run(PathStream::from_paths(paths), fs, inputs(engine), &mut rec)
            .await;
        assert_eq!(out.processed, 3);
        assert_eq!(out.errors, 1);
        assert!(rec.errors[0].1.contains("panicked"));
    }

    #[tokio::test]
    async fn test_pool_formats_output() {
        let (fs, paths) = memory(1);
        let mut inp = inputs(Arc::new(ScriptedEngine::per_file(|_| Ok(Some("a  b".into())))));
        inp.formatter = Some(Arc::new(crate::engines::formatter::CommandFormatter::new("tr -s ' '")));
        let mut rec = Recorder::default();
        WorkerPool::new(PoolConfig::default())
            .run(PathStream::from_paths(paths), fs, inp, &mut rec)
            .await;
        assert_eq!(rec.commands[0].new_content(), Some("a b"));
    }

    /// Hangs forever on paths ending in `hang`, flagging when dropped.
    struct HangingEngine {
        dropped: Arc<AtomicBool>,
        started: AtomicUsize,
        delay: Duration,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TransformEngine for HangingEngine {
        async fn transform_file(&self, task: &WorkerTask) -> Result<Option<String>, String> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if task.path.to_string_lossy().ends_with("hang") {
                let _flag = DropFlag(Arc::clone(&self.dropped));
                std::future::pending::<()>().await;
            }
            sleep(self.delay).await;
            Ok(Some(format!("{}!", task.content)))
        }

        async fn transform_tree(&self, _input: &TreeInput) -> Result<Vec<TreeEdit>, String> {
            Ok(Vec::new())
        }

        async fn run_script(&self, _input: &ScriptInput) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_idle_timeout_terminates_workers() {
        let fs = Arc::new(MemoryFs::from_files([
            ("/r/a", "a"),
            ("/r/b", "b"),
            ("/r/c.hang", "c"),
            ("/r/d.hang", "d"),
        ]));
        let paths = vec!["/r/a".into(), "/r/b".into(), "/r/c.hang".into(), "/r/d.hang".into()];
        let dropped = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(HangingEngine {
            dropped: Arc::clone(&dropped),
            started: AtomicUsize::new(0),
            delay: Duration::from_secs(1),
        });

        let started_at = Instant::now();
        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig {
            workers: 2,
            idle_timeout: Duration::from_secs(30),
        })
        .run(PathStream::from_paths(paths), fs, inputs(engine.clone()), &mut rec)
        .await;

        assert!(out.timed_out);
        assert_eq!(out.processed, 2);
        assert_eq!(rec.commands.len(), 2);
        assert!(rec.errors.is_empty());
        assert!(started_at.elapsed() >= Duration::from_secs(30));
        assert!(started_at.elapsed() < Duration::from_secs(40));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst), "hung transform was not terminated");
        assert_eq!(engine.started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_slow_progress_resets_timer() {
        let (fs, paths) = memory(4);
        let engine = Arc::new(HangingEngine {
            dropped: Arc::new(AtomicBool::new(false)),
            started: AtomicUsize::new(0),
            delay: Duration::from_secs(20),
        });
        let mut rec = Recorder::default();
        let out = WorkerPool::new(PoolConfig {
            workers: 1,
            idle_timeout: Duration::from_secs(30),
        })
        .run(PathStream::from_paths(paths), fs, inputs(engine), &mut rec)
        .await;

        assert!(!out.timed_out);
        assert_eq!(out.processed, 4);
        assert_eq!(rec.commands.len(), 4);
    }
}
