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

//! Synthetic values: strings with argument holes spliced into them.
//!
//! A [`SyntheticValue`] decomposes an observed string into literal runs and
//! [`Argument`] holes. Decomposition is greedy and longest-first, so a given
//! string and argument pool always produce the same parts. The other half of
//! the module is alignment: matching a synthetic value against a concrete
//! string enumerates every argument binding that makes the two equal.

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use smallvec::smallvec;
use thiserror::Error;

use crate::argument::Argument;
use crate::argument::Primitive;
use crate::argument::PrimitiveKind;
use crate::argument::Transformer;
use crate::deadline::TimedOut;
use crate::deadline::check_deadline;
use crate::mapping::ArgumentMapping;

/// Semver-like version numbers are argument holes even when no explicit
/// argument covers them: package versions vary across otherwise identical
/// task invocations.
static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?:0|[1-9]\d*)
        \.(?:0|[1-9]\d*)
        (?:\.(?:0|[1-9]\d*))?
        (?:-(?:
            (?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)
            (?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*
        ))?
        (?:\+(?:[0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?",
    )
    .unwrap()
});

/// Error from mapping one value or change onto another.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// The primitive being aligned has a different scalar kind than the
    /// synthetic value.
    #[error("Cannot align a {expected} value with a {actual} primitive")]
    InvalidOperand {
        expected: PrimitiveKind,
        actual: PrimitiveKind,
    },
    /// Substituting mapped arguments produced a string that no longer
    /// parses as the value's original kind.
    #[error("Substituted value `{value}` does not parse as {kind}")]
    Reparse { kind: PrimitiveKind, value: String },
    /// Two changes of different kinds cannot be mapped onto each other.
    #[error("Cannot map a `{source_kind}` change onto a `{target}` change")]
    TypeMismatch {
        /// Kind name of the value being mapped.
        source_kind: &'static str,
        /// Kind name of the value being mapped onto.
        target: &'static str,
    },
    /// The active deadline expired mid-search.
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

/// One run of a decomposed string: either a literal or an argument hole.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Part {
    /// A fixed run of text.
    Literal(String),
    /// A hole standing for a variable segment.
    Argument(Argument),
}

impl Part {
    /// The string this part contributes to the concatenated form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Argument(arg) => arg.value(),
        }
    }
}

/// A string value with zero or more argument holes.
///
/// Invariants: concatenating the parts' string forms reproduces the
/// original value; no two adjacent parts are literals; `arguments` is
/// exactly the set of arguments appearing in `parts`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyntheticValue {
    original: Primitive,
    parts: SmallVec<[Part; 4]>,
    arguments: BTreeSet<Argument>,
}

impl SyntheticValue {
    /// Decomposes `original` over the argument pool.
    ///
    /// The pool is augmented with version-number substrings of the value
    /// and, for every pooled argument containing a dot, a slashed variant
    /// (when that variant actually occurs in the value). Candidates are
    /// then applied longest-first; an argument that never matches is
    /// dropped.
    pub fn new(
        original: impl Into<Primitive>,
        pool: impl IntoIterator<Item = Argument>,
    ) -> Self {
        let original = original.into();
        let text = original.to_string();

        let mut candidates: BTreeSet<Argument> = pool.into_iter().collect();
        for found in VERSION_REGEX.find_iter(&text) {
            candidates.insert(Argument::new(found.as_str()));
        }
        let slashed: Vec<_> = candidates
            .iter()
            .filter(|arg| arg.value().contains('.'))
            .filter_map(|arg| {
                let replaced = arg.value().replace('.', "/");
                text.contains(&replaced).then(|| {
                    Argument::transformed(replaced, Transformer::RestoreDots, arg.value())
                })
            })
            .collect();
        candidates.extend(slashed);

        // Longest first; ties resolved by value so the decomposition is
        // canonical for a given (value, pool).
        let mut ordered: Vec<_> = candidates.into_iter().collect();
        ordered.sort_by(|a, b| {
            b.value()
                .len()
                .cmp(&a.value().len())
                .then_with(|| a.value().cmp(b.value()))
        });

        let mut parts: SmallVec<[Part; 4]> = if text.is_empty() {
            smallvec![]
        } else {
            smallvec![Part::Literal(text)]
        };
        for argument in ordered {
            if argument.value().is_empty() {
                continue;
            }
            let mut new_parts = SmallVec::new();
            for part in parts {
                let Part::Literal(text) = part else {
                    new_parts.push(part);
                    continue;
                };
                for (i, piece) in text.split(argument.value()).enumerate() {
                    if i > 0 {
                        new_parts.push(Part::Argument(argument.clone()));
                    }
                    if !piece.is_empty() {
                        new_parts.push(Part::Literal(piece.to_owned()));
                    }
                }
            }
            parts = new_parts;
        }

        let arguments = parts
            .iter()
            .filter_map(|part| match part {
                Part::Argument(arg) => Some(arg.clone()),
                Part::Literal(_) => None,
            })
            .collect();
        Self {
            original,
            parts,
            arguments,
        }
    }

    /// The scalar this value was decomposed from.
    pub fn original(&self) -> &Primitive {
        &self.original
    }

    /// The scalar kind of the original value.
    pub fn kind(&self) -> PrimitiveKind {
        self.original.kind()
    }

    /// The literal runs and holes, in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The set of arguments appearing in the parts.
    pub fn arguments(&self) -> &BTreeSet<Argument> {
        &self.arguments
    }

    /// Rebuilds this value with mapped arguments substituted.
    ///
    /// Arguments bound in `mapping` are replaced by their targets; unbound
    /// arguments and literals pass through, so partial mappings are fine.
    /// The concatenated result is reparsed to the original scalar kind; no
    /// hole inference is redone.
    pub fn from_mapping(&self, mapping: &ArgumentMapping) -> Result<Self, MapError> {
        let parts: SmallVec<[Part; 4]> = self
            .parts
            .iter()
            .map(|part| match part {
                Part::Argument(arg) => match mapping.target(arg) {
                    Some(target) => Part::Argument(target.clone()),
                    None => part.clone(),
                },
                Part::Literal(_) => part.clone(),
            })
            .collect();
        let arguments = parts
            .iter()
            .filter_map(|part| match part {
                Part::Argument(arg) => Some(arg.clone()),
                Part::Literal(_) => None,
            })
            .collect();
        let text: String = parts.iter().map(Part::as_str).collect();
        let kind = self.original.kind();
        let original = Primitive::parse_as(kind, &text).ok_or(MapError::Reparse {
            kind,
            value: text,
        })?;
        Ok(Self {
            original,
            parts,
            arguments,
        })
    }

    /// Enumerates every argument binding that aligns this value with a
    /// concrete primitive.
    ///
    /// The empty set means no alignment exists. A valid alignment with no
    /// arguments produces the set containing the empty mapping; an exact
    /// match produces the identity mapping over this value's arguments.
    /// Fails with [`MapError::InvalidOperand`] when `other` is of a
    /// different scalar kind, and respects the active deadline.
    pub fn map_to_primitive(
        &self,
        other: &Primitive,
    ) -> Result<BTreeSet<ArgumentMapping>, MapError> {
        if other.kind() != self.original.kind() {
            return Err(MapError::InvalidOperand {
                expected: self.original.kind(),
                actual: other.kind(),
            });
        }

        if self.original == *other {
            return Ok(BTreeSet::from([ArgumentMapping::identity(&self.arguments)]));
        }
        if self.arguments.is_empty() {
            return Ok(BTreeSet::new());
        }

        // Tokenize: literal runs flatten to characters so that alignment
        // advances one character at a time.
        #[derive(Clone, Copy)]
        enum Token<'a> {
            Char(char),
            Argument(&'a Argument),
        }
        let mut tokens: Vec<Token> = Vec::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => tokens.extend(text.chars().map(Token::Char)),
                Part::Argument(arg) => tokens.push(Token::Argument(arg)),
            }
        }
        let other_chars: Vec<char> = other.to_string().chars().collect();

        let mut mappings = BTreeSet::new();
        let mut states = vec![(0usize, 0usize, ArgumentMapping::new())];
        while let Some((mut self_idx, mut other_idx, mapping)) = states.pop() {
            check_deadline()?;

            // Consume matching characters in lockstep.
            while self_idx < tokens.len() && other_idx < other_chars.len() {
                match tokens[self_idx] {
                    Token::Char(c) if c == other_chars[other_idx] => {
                        self_idx += 1;
                        other_idx += 1;
                    }
                    _ => break,
                }
            }

            // Simultaneous exhaustion is a valid alignment; unilateral
            // exhaustion is not.
            if self_idx == tokens.len() && other_idx == other_chars.len() {
                mappings.insert(mapping);
                continue;
            }
            if self_idx == tokens.len() || other_idx == other_chars.len() {
                continue;
            }

            let Token::Argument(arg) = tokens[self_idx] else {
                // Mismatched literal characters.
                continue;
            };

            // A bound argument must reproduce its mapped value in place.
            if let Some(mapped) = mapping.target(arg) {
                let mapped_chars: Vec<char> = mapped.value().chars().collect();
                let end = other_idx + mapped_chars.len();
                if end <= other_chars.len() && other_chars[other_idx..end] == mapped_chars[..] {
                    states.push((self_idx + 1, end, mapping));
                }
                continue;
            }

            // Candidate end positions for the argument's span:
            // 1. Last token: the span is the rest of `other`.
            // 2. Next token is also an argument: any boundary up to the last
            //    occurrence of the next literal character (or the end when
            //    only arguments follow).
            // 3. Next token is a literal: every position where that
            //    character occurs.
            let ends: Vec<usize> = if self_idx + 1 == tokens.len() {
                vec![other_chars.len()]
            } else if let Token::Argument(_) = tokens[self_idx + 1] {
                let next_literal = tokens[self_idx + 1..].iter().find_map(|token| match token {
                    Token::Char(c) => Some(*c),
                    Token::Argument(_) => None,
                });
                let end = match next_literal {
                    Some(c) => {
                        match other_chars[other_idx..].iter().rposition(|&o| o == c) {
                            Some(pos) => other_idx + pos + 1,
                            // The next literal never occurs, so no alignment
                            // can complete.
                            None => continue,
                        }
                    }
                    None => other_chars.len() + 1,
                };
                (other_idx..end).collect()
            } else {
                let Token::Char(next) = tokens[self_idx + 1] else {
                    unreachable!();
                };
                (other_idx..other_chars.len())
                    .filter(|&k| other_chars[k] == next)
                    .collect()
            };

            for end in ends {
                let span: String = other_chars[other_idx..end].iter().collect();
                let pair = ArgumentMapping::from_pairs([(arg.clone(), Argument::new(span))])
                    .expect("single pair is always a valid matching");
                if let Ok(merged) = mapping.merge(&pair) {
                    states.push((self_idx + 1, end, merged));
                }
            }
        }
        Ok(mappings)
    }
}

impl Display for SyntheticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
