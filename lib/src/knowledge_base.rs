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

//! Read-side façade over the task-execution knowledge base.
//!
//! The backing store is pluggable via [`TaskExecutionStore`]; the façade
//! owns the query semantics: deduplicating candidate tasks and resolving a
//! `(task, error)` pair to the tasks recorded as fixing that error, rewritten
//! into the querying task's argument space. The façade never fails — an
//! unavailable store degrades to empty results with a logged warning.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::mapping::ArgumentMapping;
use crate::serialize::CodecError;
use crate::task::System;
use crate::task::Task;
use crate::task::TaskError;

/// One recorded task execution: the task, the error it hit (if any), and the
/// task sequence that resolved that error (if recorded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskExecution {
    /// Row identifier, assigned by the store.
    pub id: u64,
    /// The configuration system the task belongs to.
    pub system: System,
    /// Coarse priority class for the covering search; larger runs first.
    /// `None` means the execution is not pinned to any level.
    pub level: Option<i64>,
    /// The executed task, changes included.
    pub task: Task,
    /// The error the execution hit, if it failed.
    pub error: Option<TaskError>,
    /// The task sequence recorded as resolving the error.
    pub resolving_tasks: Option<Vec<Task>>,
}

/// Error from a knowledge-base backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file or connection is unavailable.
    #[error("Failed to access the knowledge base")]
    Io(#[from] std::io::Error),
    /// A stored document does not decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Storage contract for task executions.
///
/// Implementations hold rows of the logical `task_executions` table and
/// answer the two filtered scans the façade needs.
pub trait TaskExecutionStore {
    /// Rows for `system`, optionally narrowed to a level. A row without a
    /// level matches every requested level: levels are a scheduling hint,
    /// not a partition.
    fn records(&self, system: System, level: Option<i64>) -> Result<Vec<TaskExecution>, StoreError>;

    /// Rows for `system` whose task runs `executable` and which recorded an
    /// error.
    fn error_records(
        &self,
        system: System,
        executable: &str,
    ) -> Result<Vec<TaskExecution>, StoreError>;
}

/// The query façade used by the covering search and the ordering layer.
pub struct KnowledgeBase {
    store: Box<dyn TaskExecutionStore>,
}

impl KnowledgeBase {
    /// Wraps a backing store.
    pub fn new(store: Box<dyn TaskExecutionStore>) -> Self {
        Self { store }
    }

    /// All distinct tasks known for `system`, optionally narrowed to a
    /// level.
    pub fn candidate_tasks(&self, system: System, level: Option<i64>) -> BTreeSet<Task> {
        match self.store.records(system, level) {
            Ok(records) => records.into_iter().map(|record| record.task).collect(),
            Err(err) => {
                warn!(%system, ?level, %err, "knowledge base unavailable; no candidate tasks");
                BTreeSet::new()
            }
        }
    }

    /// The tasks recorded as resolving `error` when it was hit by `task`
    /// (or by a task that `task` maps onto), each paired with the mapping
    /// that rewrites the resolving task into the query's argument space.
    ///
    /// `error`'s synthetic fields are expected to be decomposed over
    /// `task`'s argument pool. Resolving tasks are returned without their
    /// changes: the changes were recorded in the stored task's context and
    /// do not transfer.
    pub fn resolving_tasks(
        &self,
        task: &Task,
        error: &TaskError,
    ) -> Vec<(Task, ArgumentMapping)> {
        let records = match self.store.error_records(task.system(), task.executable()) {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "knowledge base unavailable; no resolving tasks");
                return Vec::new();
            }
        };

        // An exact task match keeps the query error as-is and resolves with
        // the empty mapping. A mappable task rewrites the query error
        // through the derived mapping; its inverse rewrites the resolving
        // tasks back into the query's argument space.
        let mut exact = Vec::new();
        let mut mapped = Vec::new();
        for record in records {
            let Some(record_error) = record.error else {
                continue;
            };
            let other_task = record.task;
            let other_error = record_error.from_arguments(other_task.argument_pool());
            let resolving: Vec<Task> = record
                .resolving_tasks
                .unwrap_or_default()
                .iter()
                .map(Task::no_changes)
                .collect();

            if *task == other_task {
                debug!(%other_task, "exact task match");
                exact.push((error.clone(), ArgumentMapping::new(), other_error, resolving));
                continue;
            }
            let secondary = task.map_to_task(&other_task);
            if !secondary.is_empty()
                && let Ok(mapped_error) = error.from_mapping(&secondary)
            {
                debug!(%other_task, "mapped task match");
                mapped.push((mapped_error, secondary.invert(), other_error, resolving));
            }
        }

        for (final_error, final_mapping, other_error, resolving) in
            exact.into_iter().chain(mapped)
        {
            if final_error == other_error {
                return resolving
                    .into_iter()
                    .map(|resolving_task| (resolving_task, final_mapping.clone()))
                    .collect();
            }
        }
        Vec::new()
    }
}
