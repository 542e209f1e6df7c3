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

//! Maximum intersection of two change sets.
//!
//! Given a source set (changes carrying argument holes) and a target set
//! (concrete changes from an image diff), [`change_intersection`] finds the
//! largest subset of source changes that can be mapped into the target under
//! one coherent argument binding. Per-pair alignments become nodes of a
//! compatibility graph (an edge means two bindings can co-exist), and a
//! maximum-weight clique picks the largest mutually consistent binding set.
//!
//! The routine is total: under any timeout or policy it returns a valid,
//! possibly empty, intersection.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use indexmap::IndexSet;
use rayon::prelude::*;
use tracing::debug;
use tracing::trace;

use crate::argument::Argument;
use crate::change::Change;
use crate::change::ChangeSet;
use crate::clique::WeightedGraph;
use crate::clique::max_weight_clique;
use crate::deadline::DeadlineError;
use crate::deadline::check_deadline;
use crate::deadline::with_deadline;
use crate::mapping::ArgumentMapping;

/// How an intersection should be computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntersectionMode {
    /// Map changes unless the pair count exceeds
    /// [`IntersectionOptions::exact_pair_threshold`].
    #[default]
    Auto,
    /// Plain set intersection with the empty mapping, regardless of size.
    Exact,
    /// Always map changes, regardless of size.
    Mapped,
}

/// Tuning knobs for [`change_intersection`].
///
/// The defaults reflect measured behavior on image diffs in the hundreds to
/// low thousands of changes; all of them are safe to tighten for
/// latency-sensitive callers.
#[derive(Clone, Debug)]
pub struct IntersectionOptions {
    /// Whether to map changes, take the exact set intersection, or decide
    /// by pair count.
    pub mode: IntersectionMode,
    /// In auto mode, pair counts above this switch to an exact set
    /// intersection.
    pub exact_pair_threshold: u64,
    /// Pair counts at or above this fan pair mapping out across threads.
    pub parallel_pair_threshold: u64,
    /// How many of the most frequent mappings to keep per source argument
    /// when building the compatibility graph. The single knob bounding
    /// graph growth on repetitive argument structure.
    pub mappings_per_argument: usize,
    /// Budget for aligning one (source, target) pair. A pair that times
    /// out contributes nothing.
    pub pair_timeout: Duration,
    /// Budget for the clique search. A timeout collapses the intersection
    /// to empty.
    pub clique_timeout: Duration,
}

impl Default for IntersectionOptions {
    fn default() -> Self {
        Self {
            mode: IntersectionMode::Auto,
            exact_pair_threshold: 25_000_000,
            parallel_pair_threshold: 500_000,
            mappings_per_argument: 19,
            pair_timeout: Duration::from_secs(1),
            clique_timeout: Duration::from_secs(30),
        }
    }
}

/// The result of intersecting two change sets: the selected subsets and the
/// binding relating them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Intersection {
    /// Source changes selected by the maximum mapping.
    pub source: ChangeSet,
    /// Target changes selected by the maximum mapping.
    pub target: ChangeSet,
    /// The coherent binding relating the two subsets.
    pub mapping: ArgumentMapping,
}

impl Intersection {
    /// Whether nothing intersected.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.target.is_empty()
    }
}

/// Computes the maximum intersection of `source` into `target`.
pub fn change_intersection(
    source: &ChangeSet,
    target: &ChangeSet,
    options: &IntersectionOptions,
) -> Intersection {
    // Only changes of the same kind can be mapped, so everything that
    // follows works on the per-kind bins.
    let source_bins = bin_by_kind(source);
    let target_bins = bin_by_kind(target);
    let shared_kinds: Vec<&'static str> = source_bins
        .keys()
        .filter(|kind| target_bins.contains_key(*kind))
        .copied()
        .collect();

    let pair_count: u64 = shared_kinds
        .iter()
        .map(|kind| source_bins[kind].len() as u64 * target_bins[kind].len() as u64)
        .sum();
    if pair_count == 0 {
        return Intersection::default();
    }

    let exact = match options.mode {
        IntersectionMode::Exact => true,
        IntersectionMode::Mapped => false,
        IntersectionMode::Auto => pair_count > options.exact_pair_threshold,
    };
    if exact {
        debug!(pair_count, "using exact intersection");
        let common: ChangeSet = source.intersection(target).cloned().collect();
        return Intersection {
            source: common.clone(),
            target: common,
            mapping: ArgumentMapping::new(),
        };
    }

    debug!(pair_count, "using intersection with mapping");
    let mut pairs: Vec<(&Change, &Change)> = Vec::with_capacity(pair_count as usize);
    for kind in &shared_kinds {
        for &source_change in &source_bins[kind] {
            for &target_change in &target_bins[kind] {
                pairs.push((source_change, target_change));
            }
        }
    }

    let pair_results: Vec<BTreeSet<ArgumentMapping>> =
        if pair_count >= options.parallel_pair_threshold {
            pairs
                .par_iter()
                .map(|&(s, t)| map_pair(s, t, options.pair_timeout))
                .collect()
        } else {
            pairs
                .iter()
                .map(|&(s, t)| map_pair(s, t, options.pair_timeout))
                .collect()
        };

    // Tally every mapping with the changes that produced it. Ordered maps
    // keep the rest of the pipeline deterministic.
    let mut tally: BTreeMap<ArgumentMapping, MappingStats> = BTreeMap::new();
    for ((source_change, target_change), mappings) in pairs.iter().zip(pair_results) {
        for mapping in mappings {
            let stats = tally.entry(mapping).or_default();
            stats.count += 1;
            stats.sources.insert((*source_change).clone());
            stats.targets.insert((*target_change).clone());
        }
    }
    trace!(mappings = tally.len(), "tallied pair mappings");
    if tally.is_empty() {
        return Intersection::default();
    }

    // Node selection: per source argument, the most frequent mappings it
    // appears in (frequency ties resolved by mapping order), plus the empty
    // mapping so argument-free matches still contribute.
    let mut ranked: Vec<(&ArgumentMapping, u64)> =
        tally.iter().map(|(mapping, stats)| (mapping, stats.count)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let source_arguments: BTreeSet<&Argument> =
        tally.keys().flat_map(ArgumentMapping::sources).collect();

    let mut nodes: IndexSet<&ArgumentMapping> = IndexSet::new();
    for &argument in &source_arguments {
        let mut taken = 0;
        for (mapping, _) in &ranked {
            if mapping.contains_source(argument) {
                nodes.insert(*mapping);
                taken += 1;
                if taken == options.mappings_per_argument {
                    break;
                }
            }
        }
    }
    if let Some((empty, _)) = tally.get_key_value(&ArgumentMapping::new()) {
        nodes.insert(empty);
    }

    let node_list: Vec<&ArgumentMapping> = nodes.into_iter().collect();
    let mut graph =
        WeightedGraph::new(node_list.iter().map(|mapping| tally[*mapping].count).collect());
    for i in 0..node_list.len() {
        if check_deadline().is_err() {
            return Intersection::default();
        }
        for j in (i + 1)..node_list.len() {
            if node_list[i].merge(node_list[j]).is_ok() {
                graph.add_edge(i, j);
            }
        }
    }
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "computing maximum weighted clique"
    );

    let clique_result = match with_deadline(options.clique_timeout, || max_weight_clique(&graph)) {
        Ok(result) => result,
        // Already bounded by a caller's deadline.
        Err(DeadlineError::Nested) => max_weight_clique(&graph),
    };
    let clique = match clique_result {
        Ok(clique) if !clique.is_empty() => clique,
        _ => return Intersection::default(),
    };

    let mut source_subset = ChangeSet::new();
    let mut target_subset = ChangeSet::new();
    for &index in &clique {
        let stats = &tally[node_list[index]];
        source_subset.extend(stats.sources.iter().cloned());
        target_subset.extend(stats.targets.iter().cloned());
    }
    let Ok(mapping) = ArgumentMapping::merge_all(clique.iter().map(|&index| node_list[index]))
    else {
        // Clique nodes are pairwise mergeable, so a conflict here means the
        // graph was built wrong.
        debug!("clique mappings failed to merge; returning the empty intersection");
        return Intersection::default();
    };
    Intersection {
        source: source_subset,
        target: target_subset,
        mapping,
    }
}

#[derive(Default)]
struct MappingStats {
    count: u64,
    sources: BTreeSet<Change>,
    targets: BTreeSet<Change>,
}

fn bin_by_kind(changes: &ChangeSet) -> BTreeMap<&'static str, Vec<&Change>> {
    let mut bins: BTreeMap<&'static str, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        bins.entry(change.kind_name()).or_default().push(change);
    }
    bins
}

/// Aligns one pair under the per-pair budget. Timeouts and kind conflicts
/// contribute nothing.
fn map_pair(
    source: &Change,
    target: &Change,
    timeout: Duration,
) -> BTreeSet<ArgumentMapping> {
    let result = match with_deadline(timeout, || source.map_to_other(target)) {
        Ok(result) => result,
        // Already bounded by a caller's deadline.
        Err(DeadlineError::Nested) => source.map_to_other(target),
    };
    result.unwrap_or_default()
}
