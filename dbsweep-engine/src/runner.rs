//! Shell-backed check runner.

use async_trait::async_trait;
use dbsweep_core::{expand_template_with, CheckError, CheckReport, CommandCheck};
use dbsweep_storage::ResourceContext;
use std::time::Duration;
use tokio::process::Command;

use crate::task::CheckRunner;

/// Runs a check's `command` through a shell; exit status 0 is a raw pass.
///
/// The command template is expanded like report messages: `{entity}` and
/// the item fields `{0}`, `{1}`, ... Each substituted value is single-quoted
/// for the shell, so templates must not quote placeholders themselves. The
/// trimmed stdout (or stderr when stdout is empty) becomes the report detail.
#[derive(Debug, Clone)]
pub struct ShellCheckRunner {
    shell: String,
    timeout: Option<Duration>,
}

impl Default for ShellCheckRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            timeout: None,
        }
    }
}

impl ShellCheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Kill commands that run longer than `timeout` and report them as errors.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CheckRunner for ShellCheckRunner {
    async fn evaluate(
        &self,
        check: &CommandCheck,
        context: &dyn ResourceContext,
        fields: &[String],
    ) -> Result<CheckReport, CheckError> {
        let entity = context.entity();
        let failure = |reason: String| CheckError::Execution {
            check: check.counter.clone(),
            entity: entity.to_string(),
            reason,
        };

        let template = check
            .command
            .as_deref()
            .ok_or_else(|| failure("no command configured".to_string()))?;
        let command = expand_template_with(template, entity, fields, "", shell_quote);

        let mut child = Command::new(&self.shell);
        child.arg("-c").arg(&command).kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.output())
                .await
                .map_err(|_| failure(format!("timed out after {:?}", limit)))?,
            None => child.output().await,
        }
        .map_err(|e| failure(format!("failed to spawn {}: {}", self.shell, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let detail = if stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        } else {
            stdout
        };
        tracing::trace!(command = %command, status = ?output.status.code(), "Check command finished");

        Ok(CheckReport {
            passed: output.status.success(),
            detail,
        })
    }
}

/// Quote `value` as one POSIX shell word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
