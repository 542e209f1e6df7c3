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

//! Shared fixtures for refab-lib tests.

use std::collections::BTreeSet;

use refab_lib::argument::Argument;
use refab_lib::change::Change;
use refab_lib::change::ChangeSet;
use refab_lib::change::ContentChangeKind;
use refab_lib::change::FileContentChange;
use refab_lib::knowledge_base::KnowledgeBase;
use refab_lib::knowledge_base::StoreError;
use refab_lib::knowledge_base::TaskExecution;
use refab_lib::knowledge_base::TaskExecutionStore;
use refab_lib::mapping::ArgumentMapping;
use refab_lib::simple_store::SimpleStore;
use refab_lib::task::System;
use refab_lib::task::Task;
use refab_lib::task::TaskArguments;
use refab_lib::task::TaskError;
use tempfile::TempDir;

pub fn arg(value: &str) -> Argument {
    Argument::new(value)
}

pub fn pool(values: &[&str]) -> BTreeSet<Argument> {
    values.iter().map(|&value| arg(value)).collect()
}

pub fn mapping_of(pairs: &[(&str, &str)]) -> ArgumentMapping {
    ArgumentMapping::from_pairs(pairs.iter().map(|&(s, t)| (arg(s), arg(t))))
        .expect("test mapping pairs must form a matching")
}

/// A concrete (argument-free) file addition, as an image differ would
/// report it.
pub fn file_add(path: &str) -> Change {
    Change::file_add(path, &BTreeSet::new())
}

pub fn file_delete(path: &str) -> Change {
    Change::file_delete(path, &BTreeSet::new())
}

pub fn directory_add(path: &str) -> Change {
    Change::directory_add(path, &BTreeSet::new())
}

pub fn env_set(key: &str, value: &str) -> Change {
    Change::env_set(key, value, &BTreeSet::new())
}

pub fn service_start(name: &str) -> Change {
    Change::service_start(name, &BTreeSet::new())
}

/// A concrete file change with added and deleted content runs, in order.
pub fn file_change(path: &str, rows: &[(ContentChangeKind, &str)]) -> Change {
    let empty = BTreeSet::new();
    Change::file_change(
        path,
        rows.iter()
            .map(|&(kind, content)| FileContentChange::new(kind, content, &empty)),
        &empty,
    )
}

/// A shell task; its changes are re-decomposed over the word arguments.
pub fn shell_task(executable: &str, words: &[&str], changes: ChangeSet) -> Task {
    Task::new(
        System::Shell,
        executable,
        TaskArguments::Sequence(words.iter().map(|&word| word.to_owned()).collect()),
        changes,
    )
}

pub fn shell_error(exit_code: i64, stdout: &str, stderr: &str, task: &Task) -> TaskError {
    TaskError::shell(exit_code, stdout, stderr, task.argument_pool())
}

/// An in-memory store with scripted rows, in the spirit of a mocked
/// database connection.
#[derive(Default)]
pub struct TestStore {
    executions: Vec<TaskExecution>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, level: Option<i64>, task: Task) -> Self {
        self.add(level, task, None, None);
        self
    }

    pub fn with_failure(
        mut self,
        level: Option<i64>,
        task: Task,
        error: TaskError,
        resolving_tasks: Vec<Task>,
    ) -> Self {
        self.add(level, task, Some(error), Some(resolving_tasks));
        self
    }

    fn add(
        &mut self,
        level: Option<i64>,
        task: Task,
        error: Option<TaskError>,
        resolving_tasks: Option<Vec<Task>>,
    ) {
        self.executions.push(TaskExecution {
            id: self.executions.len() as u64 + 1,
            system: task.system(),
            level,
            task,
            error,
            resolving_tasks,
        });
    }

    pub fn into_kb(self) -> KnowledgeBase {
        KnowledgeBase::new(Box::new(self))
    }
}

impl TaskExecutionStore for TestStore {
    fn records(
        &self,
        system: System,
        level: Option<i64>,
    ) -> Result<Vec<TaskExecution>, StoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|record| record.system == system)
            .filter(|record| level.is_none() || record.level.is_none() || record.level == level)
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

/// A store whose backing has gone away; every query fails.
pub struct UnavailableStore;

impl TaskExecutionStore for UnavailableStore {
    fn records(&self, _: System, _: Option<i64>) -> Result<Vec<TaskExecution>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("store offline")))
    }

    fn error_records(&self, _: System, _: &str) -> Result<Vec<TaskExecution>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("store offline")))
    }
}

/// A fresh file-backed store in a temporary directory. Keep the directory
/// alive for the store's lifetime.
pub fn temp_store() -> (TempDir, SimpleStore) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SimpleStore::init(&dir.path().join("kb.jsonl")).expect("failed to init store");
    (dir, store)
}
