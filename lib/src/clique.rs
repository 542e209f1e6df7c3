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

//! Maximum weighted clique on small undirected graphs.
//!
//! The compatibility graphs produced by change-set intersection are small
//! (hundreds to low thousands of nodes after truncation) but dense, so a
//! plain branch-and-bound with a weight bound is both adequate and
//! predictable. The search is deterministic: candidates are explored in
//! weight order with index as the tie-break, so equal-weight optima always
//! resolve the same way.

use crate::deadline::TimedOut;
use crate::deadline::check_deadline;

/// An undirected graph with node weights, stored densely.
#[derive(Clone, Debug)]
pub struct WeightedGraph {
    weights: Vec<u64>,
    adjacency: Vec<bool>,
}

impl WeightedGraph {
    pub fn new(weights: Vec<u64>) -> Self {
        let n = weights.len();
        Self {
            weights,
            adjacency: vec![false; n * n],
        }
    }

    pub fn node_count(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, node: usize) -> u64 {
        self.weights[node]
    }

    pub fn add_edge(&mut self, u: usize, v: usize) {
        assert_ne!(u, v, "self edges are not meaningful in a clique search");
        let n = self.weights.len();
        self.adjacency[u * n + v] = true;
        self.adjacency[v * n + u] = true;
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.adjacency[u * self.weights.len() + v]
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().filter(|&&e| e).count() / 2
    }
}

/// Finds a maximum-weight clique, returning its nodes in ascending order.
///
/// Runs under the caller's deadline: the bound is checked on every explored
/// branch and the search fails with [`TimedOut`] rather than returning a
/// partial answer.
pub fn max_weight_clique(graph: &WeightedGraph) -> Result<Vec<usize>, TimedOut> {
    // Heaviest first: good cliques are found early, which tightens the
    // bound for the rest of the search.
    let mut order: Vec<usize> = (0..graph.node_count()).collect();
    order.sort_by_key(|&v| (std::cmp::Reverse(graph.weight(v)), v));

    let mut best = Best {
        nodes: Vec::new(),
        weight: 0,
    };
    let mut current = Vec::new();
    expand(graph, &mut current, 0, &order, &mut best)?;

    best.nodes.sort_unstable();
    Ok(best.nodes)
}

struct Best {
    nodes: Vec<usize>,
    weight: u64,
}

fn expand(
    graph: &WeightedGraph,
    current: &mut Vec<usize>,
    current_weight: u64,
    candidates: &[usize],
    best: &mut Best,
) -> Result<(), TimedOut> {
    check_deadline()?;

    if current_weight > best.weight {
        best.nodes = current.clone();
        best.weight = current_weight;
    }

    let mut remaining: u64 = candidates.iter().map(|&v| graph.weight(v)).sum();
    for (i, &v) in candidates.iter().enumerate() {
        // Even taking every remaining candidate cannot beat the best.
        if current_weight + remaining <= best.weight {
            return Ok(());
        }
        remaining -= graph.weight(v);

        let extended: Vec<usize> = candidates[i + 1..]
            .iter()
            .copied()
            .filter(|&u| graph.has_edge(v, u))
            .collect();
        current.push(v);
        expand(graph, current, current_weight + graph.weight(v), &extended, best)?;
        current.pop();
    }
    Ok(())
}
