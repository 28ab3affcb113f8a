//! Output formatting collaborator.
//!
//! Formatting is best effort: a formatter failure leaves the content as
//! the transform produced it.

use super::command::exec_bash;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ContentFormatter: Send + Sync {
    async fn format(&self, path: &Path, content: &str) -> Result<String, String>;
}

/// Leaves content untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormatter;

#[async_trait]
impl ContentFormatter for NoopFormatter {
    async fn format(&self, _path: &Path, content: &str) -> Result<String, String> {
        Ok(content.to_string())
    }
}

/// Pipes content through a shell command; `$1` is the file path.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    pub command: String,
}

impl CommandFormatter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ContentFormatter for CommandFormatter {
    async fn format(&self, path: &Path, content: &str) -> Result<String, String> {
        let path = path.to_string_lossy();
        let out = exec_bash(&self.command, &[&*path], content.as_bytes().to_vec(), &[], None).await?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(format!(
                "formatter exited with code {}: {}",
                out.exit_code,
                out.stderr.trim()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_formatter_noop() {
        let out = NoopFormatter.format(Path::new("/a.ts"), "x  =  1").await.unwrap();
        assert_eq!(out, "x  =  1");
    }

    #[tokio::test]
    async fn test_formatter_command() {
        let f = CommandFormatter::new("tr -s ' '");
        let out = f.format(Path::new("/a.ts"), "x  =  1").await.unwrap();
        assert_eq!(out, "x = 1");
    }

    #[tokio::test]
    async fn test_formatter_command_failure() {
        let f = CommandFormatter::new("echo bad syntax >&2; exit 2");
        let err = f.format(Path::new("/a.ts"), "x").await.unwrap_err();
        assert!(err.contains("bad syntax"));
    }
}
