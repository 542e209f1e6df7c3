// Copyright 2025 The Refab Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

//! Contract for the external sandbox task runner.
//!
//! The core never executes tasks itself. The ordering layer drives an
//! implementation of [`TaskRunner`] against a sandbox container, feeding
//! failures back through the knowledge base's resolving-task lookup.

use std::time::Duration;

use thiserror::Error;

use crate::deadline::TimedOut;
use crate::task::Task;
use crate::task::TaskError;

/// The captured output of a successfully executed task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Why a task run produced no usable result.
#[derive(Debug, Error)]
pub enum RunError {
    /// The task ran and failed; the error carries the system-specific
    /// output fields.
    #[error("Task failed: {0}")]
    Task(TaskError),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

/// Executes tasks in a sandboxed environment.
pub trait TaskRunner {
    fn run_task(&mut self, task: &Task, timeout: Duration) -> Result<RunResult, RunError>;
}
