// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Command Runner
//!
//! Runs external programs with `tokio::process`, capturing stdout, stderr and
//! the exit code. Every OS adapter issues its commands through an
//! [`ExecHandler`], so tests swap this runner for a recording mock.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Process execution for package, service and node adapters

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::domain::system::{CommandOutput, ExecHandler, HandlerError};

/// Exit code reported when a process was terminated by a signal.
const SIGNALLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecHandler for CommandRunner {
    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, HandlerError> {
        debug!(command = %command, args = ?args, "Running command");

        let output = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HandlerError::io(command, e))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(SIGNALLED_EXIT_CODE),
        };
        debug!(command = %command, exit_code = result.exit_code, "Command finished");
        Ok(result)
    }
}

/// Run a command and fail on a non-zero exit.
pub async fn run_checked(
    exec: &dyn ExecHandler,
    command: &str,
    args: &[&str],
) -> Result<CommandOutput, HandlerError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let display = std::iter::once(command.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    exec.run_command(command, &args).await?.check(display)
}

/// Run a command and return its output regardless of exit code.
pub async fn run(exec: &dyn ExecHandler, command: &str, args: &[&str]) -> Result<CommandOutput, HandlerError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    exec.run_command(command, &args).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let runner = CommandRunner::new();
        let out = runner
            .run_command("sh", &["-c".into(), "echo hello; echo oops >&2; exit 3".into()])
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let runner = CommandRunner::new();
        let err = run_checked(&runner, "sh", &["-c", "exit 2"]).await.unwrap_err();
        match err {
            HandlerError::CommandFailed { command, exit_code, .. } => {
                assert_eq!(command, "sh -c exit 2");
                assert_eq!(exit_code, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = CommandRunner::new();
        let err = runner
            .run_command("/nonexistent/fleetkeeper-test-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Io { .. }));
    }
}
