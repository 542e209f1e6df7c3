// Copyright 2024 The Refab Authors
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

#![warn(missing_docs)]

//! Core library for Refab: synthesizing configuration scripts that
//! reproduce the observable differences between a baseline execution
//! environment and a configured one.
//!
//! The library is the symbolic half of the system. Observed strings are
//! decomposed into literal runs and argument holes ([`synthetic`]),
//! environment changes are modeled as a closed algebra over those values
//! ([`change`]), and the key routine ([`intersection`]) finds the largest
//! subset of a task's changes that maps onto an image diff under one
//! coherent argument binding. A greedy covering search ([`search`]) then
//! selects and binds tasks from the knowledge base ([`knowledge_base`])
//! until the diff is reproduced.
//!
//! Executing tasks, diffing images, and ordering the selected tasks are the
//! concern of external collaborators, reached only through the contracts in
//! [`run`], [`change`], and [`knowledge_base`].

pub mod argument;
pub mod change;
pub mod clique;
pub mod deadline;
pub mod intersection;
pub mod knowledge_base;
pub mod mapping;
pub mod run;
pub mod search;
pub mod serialize;
pub mod simple_store;
pub mod synthetic;
pub mod task;
