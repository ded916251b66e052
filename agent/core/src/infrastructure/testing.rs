// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0
//! Recording command runner for adapter unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::system::{CommandOutput, ExecHandler, HandlerError};

#[derive(Default)]
pub struct RecordingExec {
    calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, i32, String)>>,
}

impl RecordingExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every command line starting with `prefix`. Later registrations win.
    pub fn respond(&self, prefix: &str, exit_code: i32, stdout: &str) {
        self.responses
            .lock()
            .push((prefix.to_string(), exit_code, stdout.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ExecHandler for RecordingExec {
    async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, HandlerError> {
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().push(line.clone());

        let responses = self.responses.lock();
        let reply = responses.iter().rev().find(|(prefix, _, _)| line.starts_with(prefix.as_str()));
        Ok(match reply {
            Some((_, exit_code, stdout)) => CommandOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
                exit_code: *exit_code,
            },
            None => CommandOutput::default(),
        })
    }
}
