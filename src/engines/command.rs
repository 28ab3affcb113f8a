//! Shell-backed transform engine.
//!
//! Transforms are bash scripts run as child processes. Children are killed
//! when their handle drops, so aborting a pool worker also stops the
//! transform it was running.
//!
//! Protocol:
//! - per file: `bash -c <script> recast <path>`, content on stdin, new
//!   content on stdout
//! - structural: `bash -c <structural_command> recast <rule> <path>`, same
//!   stdin/stdout contract
//! - whole tree: stdin is `{"root":..,"files":[{"path","content"}]}`, stdout
//!   is a JSON array of tree edits
//! - script: run in the target directory
//!
//! Every invocation gets `RECAST_ARGS` (JSON object) and
//! `RECAST_TARGET_DIR` in its environment.

use super::{ScriptInput, TransformEngine, TreeEdit, TreeFile, TreeInput, WorkerTask};
use crate::core::types::EngineKind;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Output from one child process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn into_stdout(self) -> Result<String, String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            let detail = self.stderr.trim();
            if detail.is_empty() {
                Err(format!("transform exited with code {}", self.exit_code))
            } else {
                Err(format!("transform exited with code {}: {}", self.exit_code, detail))
            }
        }
    }
}

/// Run `script` with bash, feeding `stdin` and positional `args`.
pub async fn exec_bash(
    script: &str,
    args: &[&str],
    stdin: Vec<u8>,
    env: &[(&str, String)],
    cwd: Option<&Path>,
) -> Result<ExecOutput, String> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(script)
        .arg("recast")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| format!("failed to spawn bash: {}", e))?;

    // Feed stdin concurrently so a chatty child cannot block on a full stdout pipe.
    let writer = child.stdin.take().map(|mut pipe| {
        tokio::spawn(async move {
            let _ = pipe.write_all(&stdin).await;
        })
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("wait error: {}", e))?;
    if let Some(writer) = writer {
        let _ = writer.await;
    }

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[derive(Serialize)]
struct TreePayload<'a> {
    root: &'a Path,
    files: &'a [TreeFile],
}

/// The shipped engine.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine {
    /// Shell command for structural rules; `$1` is the rule, `$2` the file.
    pub structural_command: Option<String>,
}

impl CommandEngine {
    pub fn new(structural_command: Option<String>) -> Self {
        Self { structural_command }
    }
}

fn args_env(arguments: &super::Arguments, target: &Path) -> Result<Vec<(&'static str, String)>, String> {
    let args = serde_json::to_string(arguments).map_err(|e| format!("cannot encode arguments: {}", e))?;
    Ok(vec![
        ("RECAST_ARGS", args),
        ("RECAST_TARGET_DIR", target.to_string_lossy().to_string()),
    ])
}

#[async_trait]
impl TransformEngine for CommandEngine {
    fn preflight(&self, kind: EngineKind) -> Result<(), String> {
        if kind == EngineKind::Structural && self.structural_command.is_none() {
            return Err("structural engine requires `structural_command` in recast.yaml".to_string());
        }
        Ok(())
    }

    async fn transform_file(&self, task: &WorkerTask) -> Result<Option<String>, String> {
        let env = args_env(&task.arguments, &task.target)?;
        let path = task.path.to_string_lossy();
        let stdin = task.content.clone().into_bytes();

        let output = match task.engine {
            EngineKind::Structural => {
                let command = self
                    .structural_command
                    .as_deref()
                    .ok_or_else(|| "no structural_command configured".to_string())?;
                let rule = task.source.path.to_string_lossy();
                exec_bash(command, &[&*rule, &*path], stdin, &env, None).await?
            }
            _ => exec_bash(&task.source.text, &[&*path], stdin, &env, None).await?,
        };
        debug!(path = %task.path.display(), exit = output.exit_code, "per-file transform finished");
        output.into_stdout().map(Some)
    }

    async fn transform_tree(&self, input: &TreeInput) -> Result<Vec<TreeEdit>, String> {
        let env = args_env(&input.arguments, &input.root)?;
        let payload = serde_json::to_vec(&TreePayload {
            root: &input.root,
            files: &input.files,
        })
        .map_err(|e| format!("cannot encode tree input: {}", e))?;

        let stdout = exec_bash(&input.source.text, &[], payload, &env, Some(&input.root))
            .await?
            .into_stdout()?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&stdout).map_err(|e| format!("invalid tree edits from transform: {}", e))
    }

    async fn run_script(&self, input: &ScriptInput) -> Result<(), String> {
        let env = args_env(&input.arguments, &input.target)?;
        exec_bash(&input.source.text, &[], Vec::new(), &env, Some(&input.target))
            .await?
            .into_stdout()
            .map(|_| ())
    }
}
