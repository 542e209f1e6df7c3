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

//! A local file-backed knowledge-base store.
//!
//! Rows of the logical `task_executions` table are kept as one JSON document
//! per line, in the stable encoding of [`crate::serialize`]. The whole store
//! is loaded into memory on open and appended to on insert; this is the
//! reference implementation of the store contract, adequate for local
//! synthesis runs and for tests. Shared deployments put the same documents
//! behind a database instead.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead as _;
use std::io::BufReader;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::knowledge_base::StoreError;
use crate::knowledge_base::TaskExecution;
use crate::knowledge_base::TaskExecutionStore;
use crate::serialize::execution_from_value;
use crate::serialize::execution_to_value;
use crate::task::System;
use crate::task::Task;
use crate::task::TaskError;

/// A JSON-lines store of task executions.
#[derive(Debug)]
pub struct SimpleStore {
    path: PathBuf,
    executions: Vec<TaskExecution>,
}

impl SimpleStore {
    /// Creates a new, empty store file, truncating any existing one.
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        File::create(path)?;
        Ok(Self {
            path: path.to_owned(),
            executions: Vec::new(),
        })
    }

    /// Loads an existing store file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let reader = BufReader::new(File::open(path)?);
        let mut executions = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str(&line).map_err(crate::serialize::CodecError::Json)?;
            executions.push(execution_from_value(&value)?);
        }
        Ok(Self {
            path: path.to_owned(),
            executions,
        })
    }

    /// The store file's location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The number of stored executions.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Whether the store has no executions.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Records a task execution. Returns `false` without writing when an
    /// equal execution is already stored.
    ///
    /// Uniqueness is `(task, error, resolving_tasks)`; a requested `level`
    /// additionally has to match for a row to count as a duplicate.
    pub fn insert(
        &mut self,
        level: Option<i64>,
        task: Task,
        error: Option<TaskError>,
        resolving_tasks: Option<Vec<Task>>,
    ) -> Result<bool, StoreError> {
        let duplicate = self.executions.iter().any(|existing| {
            existing.task == task
                && existing.error == error
                && existing.resolving_tasks == resolving_tasks
                && (level.is_none() || existing.level == level)
        });
        if duplicate {
            debug!(%task, "task execution already stored; skipping");
            return Ok(false);
        }

        let execution = TaskExecution {
            id: self.executions.last().map_or(1, |last| last.id + 1),
            system: task.system(),
            level,
            task,
            error,
            resolving_tasks,
        };
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", execution_to_value(&execution))?;
        self.executions.push(execution);
        Ok(true)
    }
}

impl TaskExecutionStore for SimpleStore {
    fn records(
        &self,
        system: System,
        level: Option<i64>,
    ) -> Result<Vec<TaskExecution>, StoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|record| record.system == system)
            .filter(|record| {
                // A level-less row matches every requested level.
                level.is_none() || record.level.is_none() || record.level == level
            })
            .cloned()
            .collect())
    }

    fn error_records(
        &self,
        system: System,
        executable: &str,
    ) -> Result<Vec<TaskExecution>, StoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|record| {
                record.system == system
                    && record.task.executable() == executable
                    && record.error.is_some()
            })
            .cloned()
            .collect())
    }
}
