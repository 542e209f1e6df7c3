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

//! Covering search: selecting tasks whose changes cover a target set.
//!
//! Given a target change set, [`cover_changes`] greedily picks the candidate
//! task that covers the most of the remaining changes, binds it with the
//! argument mapping from its change intersection, and repeats against the
//! residual. A candidate can be selected more than once with different
//! bindings, since each round intersects against what is still uncovered.
//! The output is unordered; sequencing the selected tasks (and resolving
//! runtime failures) belongs to the ordering layer.

use itertools::Itertools as _;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::change::ChangeSet;
use crate::intersection::IntersectionOptions;
use crate::intersection::change_intersection;
use crate::knowledge_base::KnowledgeBase;
use crate::mapping::ArgumentMapping;
use crate::task::System;
use crate::task::Task;

/// One selected covering task: the bound task, the template it came from,
/// the binding, and the target changes it covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The candidate with the binding applied.
    pub task: Task,
    /// The candidate as stored in the knowledge base.
    pub original_task: Task,
    /// The binding from the candidate's arguments into the target's values.
    pub mapping: ArgumentMapping,
    /// The target changes this selection covers.
    pub covered: ChangeSet,
}

/// The result of one covering round: the selections and whatever could not
/// be covered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Covering {
    /// The selected bound tasks, in selection order.
    pub selections: Vec<Selection>,
    /// Target changes no candidate could cover.
    pub residual: ChangeSet,
    /// Size of the candidate pool the round drew from, reported alongside
    /// the residual when synthesis falls short.
    pub pool_size: usize,
}

/// Selects a covering of `target` from the knowledge base's candidates for
/// `system` at `level`.
///
/// Total: an empty candidate pool or an uncoverable target yields an empty
/// selection list with the target as residual.
pub fn cover_changes(
    kb: &KnowledgeBase,
    target: &ChangeSet,
    system: System,
    level: Option<i64>,
    options: &IntersectionOptions,
) -> Covering {
    let candidates: Vec<Task> = kb.candidate_tasks(system, level).into_iter().collect();
    debug!(
        candidates = candidates.len(),
        changes = target.len(),
        "starting covering search"
    );

    let mut residual = target.clone();
    let mut selections = Vec::new();
    while !residual.is_empty() {
        let Some(best) = select_best(&candidates, &residual, options) else {
            break;
        };
        debug!(task = %best.original_task, mapping = %best.mapping, "selected covering task");
        for covered in &best.covered {
            residual.remove(covered);
        }
        selections.push(best);
    }

    Covering {
        selections,
        residual,
        pool_size: candidates.len(),
    }
}

/// Picks the candidate covering the most residual changes. Ties prefer the
/// candidate with fewer unbound arguments, then the earlier task in sorted
/// order (the candidate list is sorted, so the first seen wins).
fn select_best(
    candidates: &[Task],
    residual: &ChangeSet,
    options: &IntersectionOptions,
) -> Option<Selection> {
    let mut best: Option<(usize, usize, Selection)> = None;
    for candidate in candidates {
        let intersection = change_intersection(candidate.changes(), residual, options);
        if intersection.source.is_empty() || intersection.target.is_empty() {
            continue;
        }

        let covered_count = intersection.source.len();
        let unbound = candidate
            .argument_pool()
            .iter()
            .filter(|&argument| !intersection.mapping.contains_source(argument))
            .count();
        let improves = match &best {
            None => true,
            Some((best_covered, best_unbound, _)) => {
                covered_count > *best_covered
                    || (covered_count == *best_covered && unbound < *best_unbound)
            }
        };
        if !improves {
            continue;
        }

        let bound = match candidate.from_mapping(&intersection.mapping) {
            Ok(bound) => bound,
            Err(err) => {
                warn!(task = %candidate, %err, "cannot bind candidate; skipping");
                continue;
            }
        };
        best = Some((
            covered_count,
            unbound,
            Selection {
                task: bound,
                original_task: candidate.clone(),
                mapping: intersection.mapping,
                covered: intersection.target,
            },
        ));
    }
    best.map(|(_, _, selection)| selection)
}

/// The outcome of a multi-level synthesis pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Synthesis {
    /// Selected bound tasks across all levels, in selection order.
    pub tasks: Vec<Task>,
    /// Changes no task pool could cover.
    pub residual: ChangeSet,
    /// Candidate pool size of the last attempted level.
    pub pool_size: usize,
}

/// Runs the covering search over `levels` in order, subtracting each
/// round's reproduced changes before the next.
///
/// This is the sandbox-free driver: instead of re-diffing an image after
/// executing each round, it credits every change the bound tasks are known
/// to produce. Callers with a sandbox re-diff externally and invoke
/// [`cover_changes`] per round instead.
pub fn synthesize_tasks(
    kb: &KnowledgeBase,
    target: &ChangeSet,
    system: System,
    levels: &[i64],
    options: &IntersectionOptions,
) -> Synthesis {
    let mut residual = target.clone();
    let mut tasks = Vec::new();
    let mut pool_size = 0;
    for &level in levels {
        if residual.is_empty() {
            break;
        }
        info!(level, remaining = residual.len(), "running covering search");
        let covering = cover_changes(kb, &residual, system, Some(level), options);
        pool_size = covering.pool_size;
        residual = covering.residual;
        for selection in covering.selections {
            // The bound task may reproduce changes beyond the ones it was
            // selected to cover; credit those too.
            let remaining = residual
                .difference(selection.task.changes())
                .cloned()
                .collect();
            residual = remaining;
            tasks.push(selection.task);
        }
    }
    if residual.is_empty() {
        info!("no more changes to reproduce");
    } else {
        info!(
            remaining = residual.len(),
            pool_size,
            residual = %residual.iter().map(|change| change.kind_name()).join(", "),
            "synthesis left changes uncovered"
        );
    }
    Synthesis {
        tasks,
        residual,
        pool_size,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use maplit::btreeset;

    use super::*;
    use crate::change::Change;
    use crate::knowledge_base::StoreError;
    use crate::knowledge_base::TaskExecution;
    use crate::knowledge_base::TaskExecutionStore;
    use crate::task::TaskArguments;

    struct MemoryStore {
        executions: Vec<TaskExecution>,
    }

    impl TaskExecutionStore for MemoryStore {
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
                    level.is_none()
                        || record.level.is_none()
                        || record.level == level
                })
                .cloned()
                .collect())
        }

        fn error_records(
            &self,
            _: System,
            _: &str,
        ) -> Result<Vec<TaskExecution>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn shell_task(executable: &str, words: &[&str], changes: ChangeSet) -> Task {
        Task::new(
            System::Shell,
            executable,
            TaskArguments::Sequence(words.iter().map(|&w| w.to_owned()).collect()),
            changes,
        )
    }

    fn kb_with(tasks: &[Task]) -> KnowledgeBase {
        let executions = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| TaskExecution {
                id: i as u64 + 1,
                system: task.system(),
                level: Some(1),
                task: task.clone(),
                error: None,
                resolving_tasks: None,
            })
            .collect();
        KnowledgeBase::new(Box::new(MemoryStore { executions }))
    }

    #[test]
    fn test_covers_with_repeated_template() {
        let touch = shell_task(
            "touch",
            &["file.txt"],
            btreeset! {Change::file_add("file.txt", &BTreeSet::new())},
        );
        let kb = kb_with(&[touch.clone()]);
        let target = btreeset! {
            Change::file_add("x.txt", &BTreeSet::new()),
            Change::file_add("y.txt", &BTreeSet::new()),
        };

        let covering = cover_changes(
            &kb,
            &target,
            System::Shell,
            Some(1),
            &IntersectionOptions::default(),
        );
        assert!(covering.residual.is_empty());
        assert_eq!(covering.selections.len(), 2);
        let bound_arguments: BTreeSet<&TaskArguments> = covering
            .selections
            .iter()
            .map(|selection| selection.task.arguments())
            .collect();
        let x_args = TaskArguments::Sequence(vec!["x.txt".to_owned()]);
        let y_args = TaskArguments::Sequence(vec!["y.txt".to_owned()]);
        assert_eq!(bound_arguments, btreeset! { &x_args, &y_args });
        for selection in &covering.selections {
            assert_eq!(selection.original_task, touch);
            assert_eq!(
                selection.task,
                touch.from_mapping(&selection.mapping).unwrap()
            );
        }
    }

    #[test]
    fn test_prefers_larger_covering() {
        let single = shell_task(
            "touch",
            &["file.txt"],
            btreeset! {Change::file_add("file.txt", &BTreeSet::new())},
        );
        let double = shell_task(
            "setup",
            &["file.txt"],
            btreeset! {
                Change::file_add("file.txt", &BTreeSet::new()),
                Change::directory_add("/etc/setup", &BTreeSet::new()),
            },
        );
        let kb = kb_with(&[single, double.clone()]);
        let target = btreeset! {
            Change::file_add("a.conf", &BTreeSet::new()),
            Change::directory_add("/etc/setup", &BTreeSet::new()),
        };

        let covering = cover_changes(
            &kb,
            &target,
            System::Shell,
            Some(1),
            &IntersectionOptions::default(),
        );
        assert!(covering.residual.is_empty());
        assert_eq!(covering.selections.len(), 1);
        assert_eq!(covering.selections[0].original_task, double);
    }

    #[test]
    fn test_uncoverable_residual_reported() {
        let touch = shell_task(
            "touch",
            &["file.txt"],
            btreeset! {Change::file_add("file.txt", &BTreeSet::new())},
        );
        let kb = kb_with(&[touch]);
        let target = btreeset! {
            Change::file_add("x.txt", &BTreeSet::new()),
            Change::service_start("nginx", &BTreeSet::new()),
        };

        let covering = cover_changes(
            &kb,
            &target,
            System::Shell,
            Some(1),
            &IntersectionOptions::default(),
        );
        assert_eq!(covering.selections.len(), 1);
        assert_eq!(
            covering.residual,
            btreeset! {Change::service_start("nginx", &BTreeSet::new())}
        );
        assert_eq!(covering.pool_size, 1);
    }

    #[test]
    fn test_empty_pool() {
        let kb = kb_with(&[]);
        let target = btreeset! {Change::file_add("x.txt", &BTreeSet::new())};
        let covering = cover_changes(
            &kb,
            &target,
            System::Shell,
            Some(1),
            &IntersectionOptions::default(),
        );
        assert_eq!(covering.selections, Vec::new());
        assert_eq!(covering.residual, target);
        assert_eq!(covering.pool_size, 0);
    }

    #[test]
    fn test_synthesize_tasks_over_levels() {
        let touch = shell_task(
            "touch",
            &["file.txt"],
            btreeset! {Change::file_add("file.txt", &BTreeSet::new())},
        );
        let kb = kb_with(&[touch]);
        let target = btreeset! {Change::file_add("x.txt", &BTreeSet::new())};
        let synthesis = synthesize_tasks(
            &kb,
            &target,
            System::Shell,
            &[1, 0],
            &IntersectionOptions::default(),
        );
        assert!(synthesis.residual.is_empty());
        assert_eq!(synthesis.tasks.len(), 1);
    }
}
